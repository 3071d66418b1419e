//! Runtime command handling.

use crate::communication::{AckProtocolEngine, ProtocolError};
use crate::print_job::JobStreamer;
use crate::telemetry::TelemetryRelay;
use relay_shared::firmware::{HOME, LINEAR_MOVE, RELATIVE_POSITIONING};
use relay_shared::{Command, EventKind, Instruction};
use std::sync::Arc;

/// `G28` followed by the axes; no axes homes everything.
pub fn home_instruction(axes: &[String]) -> Instruction {
    if axes.is_empty() {
        Instruction::new(HOME)
    } else {
        Instruction::new(format!("{} {}", HOME, axes.join(" ")))
    }
}

pub fn move_instruction(axis_distance: &str) -> Instruction {
    Instruction::new(format!("{} {}", LINEAR_MOVE, axis_distance))
}

pub struct CommandDispatcher {
    engine: Arc<AckProtocolEngine>,
    relay: TelemetryRelay,
    streamer: JobStreamer,
}

impl CommandDispatcher {
    pub fn new(engine: Arc<AckProtocolEngine>, relay: TelemetryRelay, streamer: JobStreamer) -> Self {
        Self {
            engine,
            relay,
            streamer,
        }
    }

    /// Parse and execute one control message. Unrecognized text is logged and
    /// ignored (`Ok(None)`); only device failures are returned as errors.
    pub async fn handle(&self, message: &str) -> Result<Option<Command>, ProtocolError> {
        let Some(command) = Command::parse(message) else {
            tracing::info!("Unknown command {}", message.trim());
            return Ok(None);
        };
        self.execute(&command).await?;
        Ok(Some(command))
    }

    pub async fn execute(&self, command: &Command) -> Result<(), ProtocolError> {
        tracing::info!("{}", command.name());
        match command {
            Command::Stop => {
                if self.streamer.request_stop().await {
                    tracing::info!("Stop printing");
                } else {
                    tracing::info!("Stop requested while idle, ignoring");
                }
            }
            Command::RelativeMove(axis_distance) => {
                // Both instructions go out back to back, nothing in between.
                let mut session = self.engine.session().await;
                session
                    .send_and_collect(&Instruction::new(RELATIVE_POSITIONING))
                    .await?;
                session
                    .send_and_collect(&move_instruction(axis_distance))
                    .await?;
            }
            Command::Home(axes) => {
                self.engine.send_and_ignore(&home_instruction(axes)).await?;
            }
            Command::RawPassthrough(text) => {
                tracing::info!("Raw message: {}", text);
                let result = self.engine.send_and_collect(&Instruction::new(text.as_str())).await?;
                self.relay.forward_result(&result, EventKind::Temp).await;
                tracing::info!("Done with msg");
            }
        }
        Ok(())
    }
}
