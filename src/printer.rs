// src/printer.rs - wiring of the relay around one device connection
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::communication::{AckProtocolEngine, AckSettings, ProtocolError, Transport};
use crate::dispatcher::CommandDispatcher;
use crate::file_manager::FileManager;
use crate::poller::IdlePoller;
use crate::print_job::{JobHandle, JobOutcome, JobStreamer, StreamSettings};
use crate::telemetry::TelemetryRelay;
use crate::web::models::{JobStatus, PrinterStatusResponse};
use crate::web::printer_channel::PrinterRequest;
use relay_shared::config::Config;
use relay_shared::firmware::FIRMWARE_INFO;
use relay_shared::{EventSink, Instruction, JobState, PrintJobError};

/// The relay: ack engine, job slot and command dispatcher sharing one device.
pub struct PrinterHost {
    config: Config,
    engine: Arc<AckProtocolEngine>,
    streamer: JobStreamer,
    dispatcher: CommandDispatcher,
    relay: TelemetryRelay,
    files: FileManager,
}

impl PrinterHost {
    pub fn new(config: Config, transport: impl Transport + 'static, sink: Arc<dyn EventSink>) -> Self {
        let engine = Arc::new(AckProtocolEngine::new(
            transport,
            AckSettings::from_config(&config),
        ));
        let relay = TelemetryRelay::new(sink);
        let streamer = JobStreamer::new(
            engine.clone(),
            relay.clone(),
            StreamSettings::from_config(&config),
        );
        let dispatcher = CommandDispatcher::new(engine.clone(), relay.clone(), streamer.clone());
        Self {
            config,
            engine,
            streamer,
            dispatcher,
            relay,
            files: FileManager::new(),
        }
    }

    pub fn with_file_manager(mut self, files: FileManager) -> Self {
        self.files = files;
        self
    }

    pub fn engine(&self) -> &Arc<AckProtocolEngine> {
        &self.engine
    }

    pub fn streamer(&self) -> &JobStreamer {
        &self.streamer
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Let the firmware boot, ask for its identity, let it settle again.
    pub async fn handshake(&self) -> Result<(), ProtocolError> {
        let delay = self.config.serial.startup_delay();
        tokio::time::sleep(delay).await;
        let result = self
            .engine
            .send_and_collect(&Instruction::new(FIRMWARE_INFO))
            .await?;
        for line in result.lines() {
            tracing::info!("Firmware: {}", line);
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }

    /// Idle temperature poller, unless disabled in the configuration.
    pub fn idle_poller(&self) -> Option<IdlePoller> {
        let interval = self.config.telemetry.idle_poll_interval()?;
        Some(IdlePoller::new(
            self.engine.clone(),
            self.relay.clone(),
            self.streamer.clone(),
            interval,
        ))
    }

    /// Load a job file and start streaming it. A missing file is rejected
    /// before the job slot is touched.
    pub async fn submit_job(&self, path: &str) -> Result<JobHandle, PrintJobError> {
        let instructions = self.files.load_job(path).await?;
        self.streamer.start_job(instructions).await
    }

    pub async fn status(&self) -> PrinterStatusResponse {
        let state = self.streamer.state().await;
        let job = match &state {
            JobState::Printing(progress) => Some(JobStatus {
                id: progress.job_id.clone(),
                current_line: progress.current_line,
                total_lines: progress.total_lines,
                percentage: progress.percentage(),
            }),
            _ => None,
        };
        let last_outcome = self.streamer.last_outcome().await.map(|outcome| match outcome {
            JobOutcome::Finished { .. } => "finished".to_string(),
            JobOutcome::Cancelled { .. } => "aborted".to_string(),
            JobOutcome::Failed { error, .. } => format!("failed: {}", error),
        });
        PrinterStatusResponse {
            state: state.name().to_string(),
            job,
            last_outcome,
        }
    }

    pub async fn handle_request(&self, request: PrinterRequest) {
        match request {
            PrinterRequest::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status().await);
            }
            PrinterRequest::SubmitJob { path, respond_to } => {
                let result = self.submit_job(&path).await.map(|handle| handle.job_id);
                if let Err(e) = &result {
                    tracing::error!("Job {} rejected: {}", path, e);
                }
                let _ = respond_to.send(result);
            }
            PrinterRequest::Command { message, respond_to } => {
                tracing::info!("Command! {}", message.trim());
                let result = self
                    .dispatcher
                    .handle(&message)
                    .await
                    .map(|command| command.map(|c| c.name().to_string()));
                if let Err(e) = &result {
                    tracing::error!("Command '{}' failed: {}", message.trim(), e);
                }
                let _ = respond_to.send(result);
            }
        }
    }

    /// Serve control requests one at a time, in arrival order, until every
    /// sender is gone.
    pub async fn run(&self, mut requests: mpsc::Receiver<PrinterRequest>) {
        while let Some(request) = requests.recv().await {
            self.handle_request(request).await;
        }
        tracing::info!("Control channel closed");
    }

    pub async fn shutdown(&self) {
        if self.streamer.request_stop().await {
            tracing::warn!("Shutting down with a job in progress");
        }
        if let Err(e) = self.engine.close().await {
            tracing::warn!("Failed to close device connection: {}", e);
        }
    }
}
