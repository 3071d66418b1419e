//! Idle-time temperature polling.

use crate::communication::{AckProtocolEngine, ProtocolError};
use crate::print_job::JobStreamer;
use crate::telemetry::TelemetryRelay;
use relay_shared::firmware::REPORT_TEMP;
use relay_shared::{EventKind, Instruction};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub struct IdlePoller {
    engine: Arc<AckProtocolEngine>,
    relay: TelemetryRelay,
    streamer: JobStreamer,
    interval: Duration,
}

impl IdlePoller {
    pub fn new(
        engine: Arc<AckProtocolEngine>,
        relay: TelemetryRelay,
        streamer: JobStreamer,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            relay,
            streamer,
            interval,
        }
    }

    /// Poll temperatures unless a job is printing. Returns whether a poll was sent.
    pub async fn poll_once(&self) -> Result<bool, ProtocolError> {
        // Job state is checked while holding the transport, so a job that
        // starts in the meantime queues behind this poll instead of racing it.
        let mut session = self.engine.session().await;
        if self.streamer.is_printing().await {
            return Ok(false);
        }
        let result = session
            .send_and_collect(&Instruction::new(REPORT_TEMP))
            .await?;
        drop(session);
        self.relay.forward_result(&result, EventKind::Temp).await;
        Ok(true)
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                tracing::warn!("Idle temperature poll failed: {}", e);
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
