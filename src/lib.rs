//! printer-relay: streams G-code to a serial printer that acknowledges every
//! line, while accepting runtime commands and relaying telemetry.

pub mod communication;
pub mod config;
pub mod dispatcher;
pub mod file_manager;
pub mod poller;
pub mod print_job;
pub mod printer;
pub mod simulator;
pub mod telemetry;
pub mod web;

pub use communication::{AckProtocolEngine, AckResult, ProtocolError, Transport, TransportError};
pub use dispatcher::CommandDispatcher;
pub use print_job::{JobHandle, JobOutcome, JobStreamer};
pub use printer::PrinterHost;
pub use relay_shared::{Command, EventKind, Instruction, JobState, PrintJobError, PrinterEvent};
pub use telemetry::{TelemetryEvent, TelemetryRelay};
