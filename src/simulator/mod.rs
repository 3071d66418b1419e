//! Simulated Marlin-style firmware on an in-memory duplex pipe.
//!
//! Used by `--simulate` and by the tests. Recent received lines are recorded and
//! answered with `ok`; a few instructions get the extra chatter real firmware
//! produces.

use crate::communication::StreamTransport;
use relay_shared::firmware::{FIRMWARE_INFO, HOME, REPORT_TEMP};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub type SimulatedTransport = StreamTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    pub nozzle_temp: f64,
    pub bed_temp: f64,
    /// Delay before each reply.
    pub response_delay: Duration,
    /// Stop replying once this many lines were received.
    pub silent_after: Option<usize>,
    /// How many of the most recent received lines to keep.
    pub history: usize,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            nozzle_temp: 24.26,
            bed_temp: 24.37,
            response_delay: Duration::ZERO,
            silent_after: None,
            history: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    received: VecDeque<String>,
    received_total: usize,
    nozzle_target: f64,
    bed_target: f64,
}

pub struct SimulatedPrinter {
    state: Arc<Mutex<SimState>>,
    task: JoinHandle<()>,
}

impl SimulatedPrinter {
    /// Start the firmware task; returns the host end of the pipe.
    pub fn spawn(options: SimulatorOptions) -> (Self, DuplexStream) {
        let (host, device) = tokio::io::duplex(4096);
        let state = Arc::new(Mutex::new(SimState::default()));
        let task = tokio::spawn(run_firmware(device, options, state.clone()));
        (Self { state, task }, host)
    }

    /// Start the firmware task and wrap the host end in a transport.
    pub fn transport(options: SimulatorOptions) -> (Self, SimulatedTransport) {
        let (printer, host) = Self::spawn(options);
        (printer, StreamTransport::from_stream("simulator", host))
    }

    /// The most recent received lines, oldest first.
    pub fn received(&self) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => state.received.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().received.iter().cloned().collect(),
        }
    }

    /// Lines received since the start, including those no longer kept.
    pub fn received_count(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.received_total,
            Err(poisoned) => poisoned.into_inner().received_total,
        }
    }
}

impl Drop for SimulatedPrinter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_firmware(device: DuplexStream, options: SimulatorOptions, state: Arc<Mutex<SimState>>) {
    let (reader, mut writer) = tokio::io::split(device);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        let replies = {
            let mut state = match state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.received_total += 1;
            if options.history > 0 {
                if state.received.len() == options.history {
                    state.received.pop_front();
                }
                state.received.push_back(line.clone());
            }
            if options.silent_after.is_some_and(|n| state.received_total > n) {
                continue;
            }
            respond(&line, &options, &mut state)
        };

        if !options.response_delay.is_zero() {
            tokio::time::sleep(options.response_delay).await;
        }
        for reply in replies {
            if writer.write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

fn respond(line: &str, options: &SimulatorOptions, state: &mut SimState) -> Vec<String> {
    let code = line.split_whitespace().next().unwrap_or_default();
    let target = || {
        line.split_whitespace()
            .find_map(|w| w.strip_prefix('S'))
            .and_then(|v| v.parse::<f64>().ok())
    };

    match code {
        REPORT_TEMP => vec![format!(
            "ok T:{:.2} /{:.2} B:{:.2} /{:.2} @:0 B@:0",
            options.nozzle_temp, state.nozzle_target, options.bed_temp, state.bed_target
        )],
        FIRMWARE_INFO => vec![
            "FIRMWARE_NAME:Marlin SIMULATED SOURCE_CODE_URL:localhost MACHINE_TYPE:relay EXTRUDER_COUNT:1"
                .to_string(),
            "ok".to_string(),
        ],
        HOME => vec![
            "echo:busy: processing".to_string(),
            "X:0.00 Y:0.00 Z:0.00 E:0.00 Count X:0 Y:0 Z:0".to_string(),
            "ok".to_string(),
        ],
        "M104" => {
            state.nozzle_target = target().unwrap_or(state.nozzle_target);
            vec!["ok".to_string()]
        }
        "M140" => {
            state.bed_target = target().unwrap_or(state.bed_target);
            vec!["ok".to_string()]
        }
        _ => vec!["ok".to_string()],
    }
}
