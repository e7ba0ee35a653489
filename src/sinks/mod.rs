//! Sinks the observation pipeline writes to
//!
//! Storage and publication are collaborators injected into the pipeline, not
//! globals: the relay owns one of each (or none) and tests swap in fakes.
//! Every call is fire-and-forget from the pipeline's point of view; an `Err`
//! is logged by the caller and the datagram is not retried.

pub mod audit;
pub mod mqtt;
pub mod sqlite;

use bytes::Bytes;
use thiserror::Error;

use crate::decoder::ProtocolRecord;

pub use audit::{AuditEvent, AuditLog};
pub use mqtt::MqttPublisher;
pub use sqlite::SqliteRecordSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("publish transport is not connected")]
    Unavailable,

    #[error("publish queue is full")]
    Backlogged,

    #[error("not a publishable topic: {0}")]
    InvalidTopic(String),
}

/// Durable, append-only record storage.
pub trait RecordSink: Send {
    fn persist(&mut self, record: &ProtocolRecord) -> Result<(), SinkError>;
}

/// Best-effort topic publication.
pub trait PublishSink: Send + Sync {
    /// Must return immediately whatever the state of the transport.
    fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), SinkError>;

    /// Message the transport announces on our behalf if we vanish without a
    /// clean disconnect.
    fn set_last_will(&self, will: LastWill) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}
