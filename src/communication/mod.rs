//! Device communication: line transport, acknowledgment engine and event sinks.

pub mod ack_protocol;
pub mod event_system;
pub mod transport;

pub use ack_protocol::{AckProtocolEngine, AckResult, AckSettings, EngineSession, ProtocolError};
pub use event_system::{BroadcastSink, RecordingSink, TracingSink};
pub use transport::{SerialTransport, StreamTransport, Transport, TransportError, open_serial};
