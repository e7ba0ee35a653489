pub mod engine;
pub mod frame;

use std::net::SocketAddr;

pub use engine::{RelayEngine, Upstream};
pub use frame::{DecodeError, DecodedText, RawFrame};

/// Outcome of relaying one datagram to the opposite party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forwarded {
    Sent { to: SocketAddr },
    Failed { reason: String },
}

impl Forwarded {
    pub fn is_sent(&self) -> bool {
        matches!(self, Forwarded::Sent { .. })
    }
}
