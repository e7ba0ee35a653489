use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;

use crate::decoder::Origin;

/// One received datagram, exactly as it came off the socket.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub bytes: Bytes,
    pub peer: SocketAddr,
    pub origin: Origin,
}

/// The datagram as text, trailing whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText(pub String);

#[derive(Debug, Error)]
#[error("{origin:?} frame from {peer} is not valid UTF-8 ({hex}): {source}")]
pub struct DecodeError {
    pub origin: Origin,
    pub peer: SocketAddr,
    pub hex: String,
    #[source]
    pub source: std::str::Utf8Error,
}

impl RawFrame {
    pub fn new(bytes: Bytes, peer: SocketAddr, origin: Origin) -> Self {
        Self { bytes, peer, origin }
    }

    pub fn decode(&self) -> Result<DecodedText, DecodeError> {
        match std::str::from_utf8(&self.bytes) {
            Ok(text) => Ok(DecodedText(text.trim_end().to_string())),
            Err(source) => Err(DecodeError {
                origin: self.origin,
                peer: self.peer,
                hex: hex::encode(&self.bytes),
                source,
            }),
        }
    }
}

impl DecodedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "10.10.70.9:2000".parse().unwrap()
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let frame = RawFrame::new(Bytes::from_static(b"AOK,abc\r\n "), peer(), Origin::Server);
        assert_eq!(frame.decode().unwrap().as_str(), "AOK,abc");
    }

    #[test]
    fn invalid_utf8_reports_raw_bytes() {
        let frame = RawFrame::new(Bytes::from_static(&[0x3e, 0xff, 0xfe]), peer(), Origin::Device);
        let err = frame.decode().unwrap_err();

        assert_eq!(err.hex, "3efffe");
        assert_eq!(err.peer, peer());
        // the raw bytes are untouched for the relay path
        assert_eq!(&frame.bytes[..], &[0x3e, 0xff, 0xfe]);
    }
}
