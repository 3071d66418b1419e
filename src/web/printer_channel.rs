//! Defines the messages sent from the web server to the control loop.

use super::models::PrinterStatusResponse;
use crate::communication::ProtocolError;
use relay_shared::PrintJobError;
use tokio::sync::oneshot;

/// A request for the control loop, answered on `respond_to`.
#[derive(Debug)]
pub enum PrinterRequest {
    /// Current job slot state.
    GetStatus {
        respond_to: oneshot::Sender<PrinterStatusResponse>,
    },
    /// Start streaming the job file at `path`; answers with the job id.
    SubmitJob {
        path: String,
        respond_to: oneshot::Sender<Result<String, PrintJobError>>,
    },
    /// Run a runtime command; answers with the command name, or `None` when
    /// the text was not recognized.
    Command {
        message: String,
        respond_to: oneshot::Sender<Result<Option<String>, ProtocolError>>,
    },
}
