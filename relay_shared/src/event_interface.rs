use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outbound event categories. The wire names are the upper-case kind strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PrinterStatus,
    JobStatus,
    Temp,
    Info,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PrinterStatus => "PRINTER_STATUS",
            EventKind::JobStatus => "JOB_STATUS",
            EventKind::Temp => "TEMP",
            EventKind::Info => "INFO",
        }
    }

    /// Topic the event is published under, e.g. `printer/TEMP`.
    pub fn topic(&self) -> String {
        format!("printer/{}", self.as_str())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload values of `PRINTER_STATUS` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterStatus {
    Printing,
    Finished,
    Aborted,
}

impl PrinterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterStatus::Printing => "printing",
            PrinterStatus::Finished => "finished",
            PrinterStatus::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterEvent {
    pub kind: EventKind,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl PrinterEvent {
    pub fn new(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn printer_status(status: PrinterStatus) -> Self {
        Self::new(EventKind::PrinterStatus, status.as_str())
    }

    pub fn job_status(percentage: u32) -> Self {
        Self::new(EventKind::JobStatus, percentage.to_string())
    }

    pub fn topic(&self) -> String {
        self.kind.topic()
    }
}

/// Destination for outbound events. Publishing never fails from the caller's
/// point of view; a sink with no consumers drops the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: PrinterEvent);
}
