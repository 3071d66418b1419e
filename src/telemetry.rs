//! Classification of device output and its relay to the event sink.

use crate::communication::AckResult;
use regex::Regex;
use relay_shared::{EventKind, EventSink, PrinterEvent};
use std::sync::{Arc, OnceLock};

/// Heartbeat the firmware prints during long-running instructions.
pub const BUSY_MARKER: &str = "echo:busy: processing";

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Temperature {
        nozzle_actual: f64,
        nozzle_target: f64,
        bed_actual: f64,
        bed_target: f64,
        /// The four readings as the device printed them, `n/nt,b/bt`.
        report: String,
    },
    Info {
        text: String,
    },
}

impl TelemetryEvent {
    /// `nozzle_actual/nozzle_target,bed_actual/bed_target` for temperatures,
    /// the raw text otherwise. Readings keep the device's own digits.
    pub fn payload(&self) -> String {
        match self {
            TelemetryEvent::Temperature { report, .. } => report.clone(),
            TelemetryEvent::Info { text } => text.clone(),
        }
    }
}

fn temperature_regex() -> &'static Regex {
    static TEMPERATURE_REGEX: OnceLock<Regex> = OnceLock::new();
    TEMPERATURE_REGEX.get_or_init(|| {
        Regex::new(
            r"^T:(?P<nozzle>[0-9.]+)\s*/\s*(?P<nozzle_target>[0-9.]+)\s+B:(?P<bed>[0-9.]+)\s*/\s*(?P<bed_target>[0-9.]+)",
        )
        .expect("invalid temperature regex")
    })
}

fn parse_temperature(line: &str) -> Option<TelemetryEvent> {
    let captures = temperature_regex().captures(line)?;
    let text = |name: &str| captures.name(name).map(|m| m.as_str());
    let (nozzle, nozzle_target, bed, bed_target) = (
        text("nozzle")?,
        text("nozzle_target")?,
        text("bed")?,
        text("bed_target")?,
    );
    Some(TelemetryEvent::Temperature {
        nozzle_actual: nozzle.parse().ok()?,
        nozzle_target: nozzle_target.parse().ok()?,
        bed_actual: bed.parse().ok()?,
        bed_target: bed_target.parse().ok()?,
        report: format!("{}/{},{}/{}", nozzle, nozzle_target, bed, bed_target),
    })
}

/// Classify one device line. Busy heartbeats produce no event.
pub fn classify(line: &str) -> Option<TelemetryEvent> {
    if line.contains(BUSY_MARKER) {
        return None;
    }
    if line.starts_with("T:") {
        if let Some(event) = parse_temperature(line) {
            return Some(event);
        }
        tracing::debug!("Unparsed temperature report: {}", line);
    }
    Some(TelemetryEvent::Info {
        text: line.to_string(),
    })
}

/// Forwards classified device output to an [`EventSink`].
#[derive(Clone)]
pub struct TelemetryRelay {
    sink: Arc<dyn EventSink>,
}

impl TelemetryRelay {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Temperatures always go out as `TEMP`; other text under `fallback`.
    pub async fn forward_line(&self, line: &str, fallback: EventKind) {
        let line = line.trim();
        let event = match classify(line) {
            Some(TelemetryEvent::Info { text }) => PrinterEvent::new(fallback, text),
            Some(temperature) => PrinterEvent::new(EventKind::Temp, temperature.payload()),
            None => return,
        };
        self.sink.publish(event).await;
    }

    /// Forward every informational line of `result`, then its payload.
    pub async fn forward_result(&self, result: &AckResult, fallback: EventKind) {
        for line in result.lines() {
            self.forward_line(line, fallback).await;
        }
    }
}
