use async_trait::async_trait;
use relay_shared::{EventSink, PrinterEvent};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Fans events out to every subscriber (HTTP event streams) and logs them.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<PrinterEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrinterEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: PrinterEvent) {
        tracing::info!("{} {}", event.topic(), event.payload);
        // No subscribers is not an error; the event is simply dropped.
        let _ = self.sender.send(event);
    }
}

/// Logs events and nothing else.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn publish(&self, event: PrinterEvent) {
        tracing::info!("{} {}", event.topic(), event.payload);
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PrinterEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PrinterEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `(kind, payload)` pairs, for compact assertions.
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .map(|e| (e.kind.as_str().to_string(), e.payload))
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: PrinterEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
