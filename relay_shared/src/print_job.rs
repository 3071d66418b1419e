use serde::Serialize;
use thiserror::Error;

/// Why a job could not be started.
#[derive(Debug, Error)]
pub enum PrintJobError {
    #[error("A job is already printing")]
    AlreadyPrinting,
    #[error("Job input not found: {0}")]
    InputNotFound(String),
    #[error("Failed to read job input: {0}")]
    Input(String),
}

/// Lifecycle of the single job slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Printing(JobProgress),
    Aborted,
    Finished,
}

impl JobState {
    pub fn is_printing(&self) -> bool {
        matches!(self, JobState::Printing(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Printing(_) => "printing",
            JobState::Aborted => "aborted",
            JobState::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub job_id: String,
    pub current_line: usize,
    pub total_lines: usize,
    pub last_reported_percentage: u32,
}

impl JobProgress {
    pub fn new(job_id: impl Into<String>, total_lines: usize) -> Self {
        Self {
            job_id: job_id.into(),
            current_line: 0,
            total_lines,
            last_reported_percentage: 0,
        }
    }

    /// `floor(current_line * 100 / total_lines)`; an empty job counts as complete.
    pub fn percentage(&self) -> u32 {
        if self.total_lines == 0 {
            return 100;
        }
        (self.current_line * 100 / self.total_lines) as u32
    }

    /// Record one processed line. Returns the new percentage when it strictly
    /// exceeds the last reported one.
    pub fn advance(&mut self) -> Option<u32> {
        self.current_line += 1;
        let percentage = self.percentage();
        if percentage > self.last_reported_percentage {
            self.last_reported_percentage = percentage;
            Some(percentage)
        } else {
            None
        }
    }
}
