//! Line-oriented byte stream to the device.
//!
//! A transport only moves newline-terminated lines. It does not know about
//! acknowledgments and does not serialize callers; the ack engine owns the
//! one instance in use and is its only caller.

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No line received within {0:?}")]
    TimedOut(Duration),
    #[error("Connection closed by device")]
    Closed,
}

/// Line send/receive primitives over a device connection.
#[async_trait]
pub trait Transport: Send {
    /// Write `text` followed by a single `\n`.
    async fn send_line(&mut self, text: &str) -> Result<(), TransportError>;

    /// Wait at most `timeout` for the next complete line. The terminator is
    /// stripped. Bytes of a line that did not complete before the timeout are
    /// kept for the next call.
    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn name(&self) -> &str;
}

/// Transport counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub lines_sent: u64,
    pub lines_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
}

/// [`Transport`] over any async reader/writer pair.
pub struct StreamTransport<R, W> {
    name: String,
    reader: BufReader<R>,
    writer: W,
    pending: Vec<u8>,
    stats: TransportStats,
    closed: bool,
}

/// Transport over a serial device.
pub type SerialTransport = StreamTransport<ReadHalf<SerialPort>, WriteHalf<SerialPort>>;

/// Open a serial device at the given baud rate.
pub fn open_serial(port: &str, baud: u32) -> Result<SerialTransport, TransportError> {
    let serial = SerialPort::open(port, baud).map_err(|source| {
        tracing::error!("Failed to open serial port {}: {}", port, source);
        TransportError::Connection {
            port: port.to_string(),
            source,
        }
    })?;
    tracing::info!("Opened {} @ {} baud", port, baud);
    Ok(StreamTransport::from_stream(port, serial))
}

impl<S> StreamTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Split a bidirectional stream into a transport.
    pub fn from_stream(name: impl Into<String>, stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(name, reader, writer)
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(name: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            name: name.into(),
            reader: BufReader::new(reader),
            writer,
            pending: Vec::new(),
            stats: TransportStats::default(),
            closed: false,
        }
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    fn take_pending_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.stats.lines_received += 1;
        self.stats.bytes_received += self.pending.len() as u64;
        self.pending.clear();
        line
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        self.stats.lines_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        tracing::trace!("{} TX: {}", self.name, text);
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        // read_until appends to `pending`, so a timed-out partial line survives.
        match tokio::time::timeout(timeout, self.reader.read_until(b'\n', &mut self.pending)).await
        {
            Err(_) => {
                self.stats.timeouts += 1;
                Err(TransportError::TimedOut(timeout))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Ok(Ok(0)) if self.pending.is_empty() => Err(TransportError::Closed),
            Ok(Ok(_)) => {
                let line = self.take_pending_line();
                tracing::trace!("{} RX: {}", self.name, line);
                Ok(line)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let stats = &self.stats;
        tracing::info!(
            "Closing {}: {} lines sent, {} lines received, {} read timeouts",
            self.name,
            stats.lines_sent,
            stats.lines_received,
            stats.timeouts
        );
        self.writer.shutdown().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn send_line_appends_single_newline() {
        let (local, mut device) = duplex(256);
        let mut transport = StreamTransport::from_stream("test", local);
        transport.send_line("G28").await.unwrap();

        let mut buf = [0u8; 16];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"G28\n");
        assert_eq!(transport.stats().lines_sent, 1);
        assert_eq!(transport.stats().bytes_sent, 4);
    }

    #[tokio::test]
    async fn read_line_strips_terminators() {
        let reader = tokio_test::io::Builder::new()
            .read(b"echo:busy: processing\r\nok\n")
            .build();
        let mut transport = StreamTransport::new("test", reader, tokio::io::sink());

        let timeout = Duration::from_millis(100);
        assert_eq!(transport.read_line(timeout).await.unwrap(), "echo:busy: processing");
        assert_eq!(transport.read_line(timeout).await.unwrap(), "ok");
        assert_eq!(transport.stats().lines_received, 2);
    }

    #[tokio::test]
    async fn read_line_times_out_and_keeps_partial_line() {
        let (local, mut device) = duplex(256);
        let mut transport = StreamTransport::from_stream("test", local);

        device.write_all(b"ok T:21").await.unwrap();
        let err = transport.read_line(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TransportError::TimedOut(_)));
        assert_eq!(transport.stats().timeouts, 1);

        device.write_all(b".5 /0.0\n").await.unwrap();
        let line = transport.read_line(Duration::from_millis(100)).await.unwrap();
        assert_eq!(line, "ok T:21.5 /0.0");
    }

    #[tokio::test]
    async fn read_line_reports_closed_connection() {
        let (local, device) = duplex(256);
        let mut transport = StreamTransport::from_stream("test", local);
        drop(device);
        let err = transport.read_line(Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_io() {
        let (local, _device) = duplex(256);
        let mut transport = StreamTransport::from_stream("test", local);
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.send_line("M105").await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn opening_missing_device_is_connection_error() {
        let Err(err) = open_serial("/dev/does-not-exist-relay", 115200) else {
            panic!("opened a device that does not exist");
        };
        assert!(matches!(err, TransportError::Connection { .. }));
    }
}
