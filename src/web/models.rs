//! Contains the data models for API requests and responses.

use serde::Serialize;

/// Response for `GET /api/v1/status`.
#[derive(Serialize, Debug)]
pub struct PrinterStatusResponse {
    /// Job slot state: "idle", "printing", "aborted" or "finished".
    pub state: String,
    /// Present while a job is printing.
    pub job: Option<JobStatus>,
    /// How the most recent job ended, if any has.
    pub last_outcome: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct JobStatus {
    pub id: String,
    pub current_line: usize,
    pub total_lines: usize,
    pub percentage: u32,
}

/// Response for `POST /api/v1/print`.
#[derive(Serialize, Debug)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Response for `POST /api/v1/commands`.
#[derive(Serialize, Debug)]
pub struct CommandResponse {
    /// False when the message was not a known command and was ignored.
    pub accepted: bool,
    pub command: Option<String>,
}
