//! Startup and process-level errors.
//!
//! Per-datagram failures never surface here: they are caught and logged where
//! they happen so the relay loop keeps running.

use std::net::SocketAddr;

use thiserror::Error;

use crate::sinks::SinkError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("cannot bind {role} socket on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address '{0}'")]
    Address(String),

    #[error("storage sink unavailable: {0}")]
    Storage(#[from] SinkError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
