//! Transparent UDP relay between a litter box and its vendor cloud.
//!
//! Every datagram is forwarded byte-for-byte to the opposite party, then
//! decoded into a typed record, audited, stored and published.

pub mod config;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod sinks;

pub use error::{RelayError, Result};
pub use pipeline::{ObservationPipeline, PipelineSettings, Sinks};
pub use relay::RelayEngine;

/// Installs the `tracing` subscriber used by the relay binary.
pub fn init_tracing(directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(directive)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
