//! Job streaming: one instruction sequence pushed through the ack engine with
//! progress reporting, periodic temperature polls and cooperative cancellation.

use crate::communication::{AckProtocolEngine, ProtocolError};
use crate::telemetry::TelemetryRelay;
use relay_shared::config::Config;
use relay_shared::event_interface::PrinterStatus;
use relay_shared::firmware::REPORT_TEMP;
use relay_shared::{EventKind, Instruction, JobProgress, JobState, PrinterEvent, PrintJobError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Issue a temperature poll after every this many processed lines; 0 disables.
    pub poll_every: usize,
    pub line_delay: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_every: config.job.temperature_poll_every,
            line_delay: config.job.line_delay(),
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Finished { job_id: String, lines: usize },
    Cancelled { job_id: String, lines: usize },
    Failed { job_id: String, lines: usize, error: String },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Finished { job_id, .. }
            | JobOutcome::Cancelled { job_id, .. }
            | JobOutcome::Failed { job_id, .. } => job_id,
        }
    }
}

/// A job streaming on its own task. Dropping the handle detaches the job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: String,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub async fn wait(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => JobOutcome::Failed {
                job_id: self.job_id,
                lines: 0,
                error: e.to_string(),
            },
        }
    }
}

struct StreamerInner {
    engine: Arc<AckProtocolEngine>,
    relay: TelemetryRelay,
    settings: StreamSettings,
    state: RwLock<JobState>,
    cancel: AtomicBool,
    last_outcome: RwLock<Option<JobOutcome>>,
}

/// Owner of the single job slot. Cloning shares the slot.
#[derive(Clone)]
pub struct JobStreamer {
    inner: Arc<StreamerInner>,
}

impl JobStreamer {
    pub fn new(engine: Arc<AckProtocolEngine>, relay: TelemetryRelay, settings: StreamSettings) -> Self {
        Self {
            inner: Arc::new(StreamerInner {
                engine,
                relay,
                settings,
                state: RwLock::new(JobState::Idle),
                cancel: AtomicBool::new(false),
                last_outcome: RwLock::new(None),
            }),
        }
    }

    pub async fn state(&self) -> JobState {
        self.inner.state.read().await.clone()
    }

    pub async fn is_printing(&self) -> bool {
        self.inner.state.read().await.is_printing()
    }

    pub async fn last_outcome(&self) -> Option<JobOutcome> {
        self.inner.last_outcome.read().await.clone()
    }

    /// Ask the running job to stop before its next instruction.
    /// Returns false, and does nothing, when no job is printing.
    pub async fn request_stop(&self) -> bool {
        let state = self.inner.state.read().await;
        if state.is_printing() {
            self.inner.cancel.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Claim the job slot and stream `instructions` on a separate task.
    pub async fn start_job(&self, instructions: Vec<Instruction>) -> Result<JobHandle, PrintJobError> {
        let job_id = self.begin(instructions.len()).await?;
        let streamer = self.clone();
        let id = job_id.clone();
        let task = tokio::spawn(async move { streamer.stream(id, instructions).await });
        Ok(JobHandle { job_id, task })
    }

    /// Claim the job slot and stream `instructions` on the current task.
    pub async fn run_job(&self, instructions: Vec<Instruction>) -> Result<JobOutcome, PrintJobError> {
        let job_id = self.begin(instructions.len()).await?;
        Ok(self.stream(job_id, instructions).await)
    }

    async fn begin(&self, total_lines: usize) -> Result<String, PrintJobError> {
        let job_id = {
            let mut state = self.inner.state.write().await;
            if state.is_printing() {
                tracing::error!("Already printing!");
                return Err(PrintJobError::AlreadyPrinting);
            }
            let job_id = Uuid::new_v4().to_string();
            // A stop aimed at an earlier job must not leak into this one.
            self.inner.cancel.store(false, Ordering::SeqCst);
            *state = JobState::Printing(JobProgress::new(job_id.clone(), total_lines));
            job_id
        };
        tracing::info!("Job {} started, total lines: {}", job_id, total_lines);
        self.publish(PrinterEvent::printer_status(PrinterStatus::Printing)).await;
        Ok(job_id)
    }

    async fn stream(&self, job_id: String, instructions: Vec<Instruction>) -> JobOutcome {
        let settings = &self.inner.settings;
        let poll = Instruction::new(REPORT_TEMP);
        let mut progress = JobProgress::new(job_id.clone(), instructions.len());

        for instruction in &instructions {
            if self.inner.cancel.load(Ordering::SeqCst) {
                tracing::warn!("Requested to stop print midway");
                return self
                    .finish(JobOutcome::Cancelled { job_id, lines: progress.current_line })
                    .await;
            }
            if !settings.line_delay.is_zero() {
                tokio::time::sleep(settings.line_delay).await;
            }

            match self.inner.engine.send_and_collect(instruction).await {
                Ok(result) => self.inner.relay.forward_result(&result, EventKind::Info).await,
                Err(e) => return self.fail(job_id, progress.current_line, e).await,
            }

            let report = progress.advance();
            *self.inner.state.write().await = JobState::Printing(progress.clone());

            if settings.poll_every > 0 && progress.current_line % settings.poll_every == 0 {
                tracing::info!(
                    "Asking for temp.. current_line={}, total_lines={}",
                    progress.current_line,
                    progress.total_lines
                );
                match self.inner.engine.send_and_collect(&poll).await {
                    Ok(result) => self.inner.relay.forward_result(&result, EventKind::Temp).await,
                    Err(e) => return self.fail(job_id, progress.current_line, e).await,
                }
            }

            if let Some(percentage) = report {
                self.publish(PrinterEvent::job_status(percentage)).await;
            }
        }

        // A stop accepted while the last instruction was in flight still aborts.
        if self.inner.cancel.load(Ordering::SeqCst) {
            tracing::warn!("Stop requested during the last instruction");
            return self
                .finish(JobOutcome::Cancelled { job_id, lines: progress.current_line })
                .await;
        }
        self.finish(JobOutcome::Finished { job_id, lines: progress.current_line })
            .await
    }

    async fn fail(&self, job_id: String, lines: usize, error: ProtocolError) -> JobOutcome {
        tracing::error!("Job {} failed after {} lines: {}", job_id, lines, error);
        self.publish(PrinterEvent::new(
            EventKind::Info,
            format!("job aborted: {}", error),
        ))
        .await;
        self.finish(JobOutcome::Failed { job_id, lines, error: error.to_string() })
            .await
    }

    async fn finish(&self, outcome: JobOutcome) -> JobOutcome {
        let (terminal, status) = match outcome {
            JobOutcome::Finished { .. } => (JobState::Finished, PrinterStatus::Finished),
            _ => (JobState::Aborted, PrinterStatus::Aborted),
        };
        tracing::info!("Job {} {}", outcome.job_id(), status.as_str());

        {
            let mut state = self.inner.state.write().await;
            self.inner.cancel.store(false, Ordering::SeqCst);
            *state = terminal;
        }
        *self.inner.last_outcome.write().await = Some(outcome.clone());
        self.publish(PrinterEvent::printer_status(status)).await;

        // A new job may already have claimed the slot.
        let mut state = self.inner.state.write().await;
        if !state.is_printing() {
            *state = JobState::Idle;
        }
        outcome
    }

    async fn publish(&self, event: PrinterEvent) {
        self.inner.relay.sink().publish(event).await;
    }
}
