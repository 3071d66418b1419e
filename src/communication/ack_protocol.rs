//! Send-one-wait-for-ack engine.
//!
//! The device accepts one instruction at a time and answers with a line
//! containing the acknowledgment token (`ok`). Anything it prints before that
//! line is informational. The engine owns the transport behind a mutex, so an
//! instruction and its acknowledgment wait always run as one unit no matter
//! how many tasks share the engine.

use crate::communication::transport::{Transport, TransportError};
use relay_shared::Instruction;
use relay_shared::config::Config;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("No acknowledgment for '{instruction}' after {waited:?}")]
    AckTimeout { instruction: String, waited: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device connection closed")]
    Closed,
}

/// Outcome of one acknowledged instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckResult {
    /// Lines received before the acknowledgment, in arrival order. Blank
    /// lines from the device are skipped and never appear here.
    pub informational: Vec<String>,
    /// Text following the token on the acknowledgment line, if any.
    pub payload: Option<String>,
}

impl AckResult {
    /// Informational lines followed by the payload.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.informational
            .iter()
            .map(String::as_str)
            .chain(self.payload.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct AckSettings {
    pub ack_token: String,
    pub read_timeout: Duration,
    pub ack_deadline: Duration,
}

impl AckSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ack_token: config.protocol.ack_token.to_ascii_lowercase(),
            read_timeout: config.serial.read_timeout(),
            ack_deadline: config.protocol.ack_deadline(),
        }
    }
}

impl Default for AckSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// If `line` is an acknowledgment, return the trimmed text after the token.
///
/// Matching is a case-insensitive substring search, so firmware chatter that
/// happens to contain the token is taken as an acknowledgment too.
pub fn match_ack<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    let start = line.to_ascii_lowercase().find(token)?;
    Some(line[start + token.len()..].trim())
}

pub struct AckProtocolEngine {
    transport: Mutex<Box<dyn Transport>>,
    settings: AckSettings,
}

impl AckProtocolEngine {
    pub fn new(transport: impl Transport + 'static, settings: AckSettings) -> Self {
        Self {
            transport: Mutex::new(Box::new(transport)),
            settings,
        }
    }

    pub fn settings(&self) -> &AckSettings {
        &self.settings
    }

    /// Exclusive use of the transport until the session is dropped.
    pub async fn session(&self) -> EngineSession<'_> {
        EngineSession {
            transport: self.transport.lock().await,
            settings: &self.settings,
        }
    }

    /// Send one instruction and wait for its acknowledgment.
    pub async fn send_and_collect(
        &self,
        instruction: &Instruction,
    ) -> Result<AckResult, ProtocolError> {
        if instruction.is_blank() {
            tracing::debug!("No message to send");
            return Ok(AckResult::default());
        }
        self.session().await.send_and_collect(instruction).await
    }

    /// Like [`send_and_collect`](Self::send_and_collect) but only logs the replies.
    pub async fn send_and_ignore(&self, instruction: &Instruction) -> Result<(), ProtocolError> {
        let result = self.send_and_collect(instruction).await?;
        for line in result.lines() {
            tracing::debug!("Ignoring reply to {}: {}", instruction, line);
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<(), ProtocolError> {
        let mut transport = self.transport.lock().await;
        transport.close().await.map_err(|e| match e {
            TransportError::Io(e) => ProtocolError::Io(e),
            _ => ProtocolError::Closed,
        })
    }
}

/// Holds the transport lock; at most one exists at a time.
pub struct EngineSession<'a> {
    transport: MutexGuard<'a, Box<dyn Transport>>,
    settings: &'a AckSettings,
}

impl EngineSession<'_> {
    pub async fn send_and_collect(
        &mut self,
        instruction: &Instruction,
    ) -> Result<AckResult, ProtocolError> {
        let text = instruction.sanitized();
        if text.is_empty() {
            tracing::debug!("No message to send");
            return Ok(AckResult::default());
        }

        tracing::debug!("Sending: {}", text);
        if let Err(e) = self.transport.send_line(text).await {
            return Err(self.protocol_error(text, e, Duration::ZERO));
        }

        let started = Instant::now();
        let mut result = AckResult::default();
        loop {
            let elapsed = started.elapsed();
            let remaining = self.settings.ack_deadline.saturating_sub(elapsed);
            if remaining.is_zero() {
                return Err(ProtocolError::AckTimeout {
                    instruction: text.to_string(),
                    waited: elapsed,
                });
            }
            let read_timeout = remaining.min(self.settings.read_timeout);
            let line = match self.transport.read_line(read_timeout).await {
                Ok(line) => line,
                Err(e) => return Err(self.protocol_error(text, e, started.elapsed())),
            };
            tracing::debug!("got {}", line);

            if let Some(payload) = match_ack(&line, &self.settings.ack_token) {
                if !payload.is_empty() {
                    result.payload = Some(payload.to_string());
                }
                return Ok(result);
            }
            if !line.trim().is_empty() {
                result.informational.push(line);
            }
        }
    }

    fn protocol_error(&self, text: &str, error: TransportError, waited: Duration) -> ProtocolError {
        let error = match error {
            TransportError::TimedOut(_) => ProtocolError::AckTimeout {
                instruction: text.to_string(),
                waited,
            },
            TransportError::Io(e) => ProtocolError::Io(e),
            TransportError::Closed | TransportError::Connection { .. } => ProtocolError::Closed,
        };
        tracing::error!("{} on {}: {}", text, self.transport.name(), error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::transport::StreamTransport;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    fn settings(read_timeout_ms: u64) -> AckSettings {
        AckSettings {
            ack_token: "ok".to_string(),
            read_timeout: Duration::from_millis(read_timeout_ms),
            ack_deadline: Duration::from_secs(5),
        }
    }

    fn engine_over(mock: tokio_test::io::Mock) -> AckProtocolEngine {
        AckProtocolEngine::new(StreamTransport::from_stream("mock", mock), settings(500))
    }

    #[test]
    fn ack_matching_is_case_insensitive_substring() {
        assert_eq!(match_ack("ok", "ok"), Some(""));
        assert_eq!(match_ack("OK", "ok"), Some(""));
        assert_eq!(
            match_ack("ok T:24.26 /0.00 B:24.37 /0.00", "ok"),
            Some("T:24.26 /0.00 B:24.37 /0.00")
        );
        assert_eq!(match_ack("echo:busy: processing", "ok"), None);
        assert_eq!(match_ack("start", "ok"), None);
    }

    #[tokio::test]
    async fn ack_payload_is_split_from_ack_line() {
        let mock = tokio_test::io::Builder::new()
            .write(b"M105\n")
            .read(b"ok T:24.26 /0.00 B:24.37 /0.00\n")
            .build();
        let engine = engine_over(mock);

        let result = engine.send_and_collect(&Instruction::new("M105")).await.unwrap();
        assert!(result.informational.is_empty());
        assert_eq!(result.payload.as_deref(), Some("T:24.26 /0.00 B:24.37 /0.00"));
    }

    #[tokio::test]
    async fn lines_before_ack_are_informational() {
        let mock = tokio_test::io::Builder::new()
            .write(b"G28 X\n")
            .read(b"echo:busy: processing\n")
            .read(b"X:0.00 Y:0.00 Z:0.00\n\n")
            .read(b"ok\n")
            .build();
        let engine = engine_over(mock);

        let result = engine
            .send_and_collect(&Instruction::new("G28 X ; home x"))
            .await
            .unwrap();
        assert_eq!(
            result.informational,
            vec!["echo:busy: processing", "X:0.00 Y:0.00 Z:0.00"]
        );
        assert_eq!(result.payload, None);
    }

    #[tokio::test]
    async fn blank_instruction_never_touches_transport() {
        // Any write would fail the mock.
        let engine = engine_over(tokio_test::io::Builder::new().build());
        for raw in ["; home all axes", "   ", ""] {
            let result = engine.send_and_collect(&Instruction::new(raw)).await.unwrap();
            assert_eq!(result, AckResult::default());
        }
    }

    #[tokio::test]
    async fn silent_device_yields_ack_timeout() {
        let (local, _device) = duplex(256);
        let engine =
            AckProtocolEngine::new(StreamTransport::from_stream("test", local), settings(30));

        let err = engine.send_and_collect(&Instruction::new("G28")).await.unwrap_err();
        match err {
            ProtocolError::AckTimeout { instruction, .. } => assert_eq!(instruction, "G28"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chatter_without_ack_hits_deadline() {
        let (local, device) = duplex(1024);
        let engine = AckProtocolEngine::new(
            StreamTransport::from_stream("test", local),
            AckSettings {
                ack_token: "ok".to_string(),
                read_timeout: Duration::from_millis(200),
                ack_deadline: Duration::from_millis(100),
            },
        );
        let chatter = tokio::spawn(async move {
            let mut device = device;
            loop {
                if device.write_all(b"echo:busy: processing\n").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let err = engine.send_and_collect(&Instruction::new("M109 S200")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::AckTimeout { .. }));
        chatter.abort();
    }

    #[tokio::test]
    async fn closed_device_is_reported() {
        let (local, device) = duplex(256);
        let engine =
            AckProtocolEngine::new(StreamTransport::from_stream("test", local), settings(500));
        let device_task = tokio::spawn(async move {
            let mut reader = BufReader::new(device);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            line
        });

        let err = engine.send_and_collect(&Instruction::new("M115")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Closed));
        assert_eq!(device_task.await.unwrap(), "M115\n");
    }
}
