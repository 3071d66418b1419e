// relay_shared: plain data shared by the transport, job and control layers

pub mod command;
pub mod config;
pub mod event_interface;
pub mod instruction;
pub mod print_job;

pub use command::Command;
pub use event_interface::{EventKind, EventSink, PrinterEvent};
pub use instruction::Instruction;
pub use print_job::{JobProgress, JobState, PrintJobError};

/// Firmware instructions the relay issues on its own behalf.
pub mod firmware {
    pub const FIRMWARE_INFO: &str = "M115";
    pub const REPORT_TEMP: &str = "M105";
    pub const RELATIVE_POSITIONING: &str = "G91";
    pub const LINEAR_MOVE: &str = "G0";
    pub const HOME: &str = "G28";
}
