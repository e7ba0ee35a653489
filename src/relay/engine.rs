//! Relay engine: two UDP endpoints and the loop between them
//!
//! ```text
//!   device ──► device-facing socket ──(server-facing socket)──► vendor server
//!   device ◄──(device-facing socket)── server-facing socket ◄── vendor server
//! ```
//!
//! Each datagram is sent on the *opposite* socket so every party sees replies
//! come from the port it originally addressed. Bytes are forwarded first and
//! verbatim; decoding and observation only start once the forward is done and
//! cannot affect it.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};

use super::frame::RawFrame;
use super::Forwarded;
use crate::config::RelayConfig;
use crate::decoder::Origin;
use crate::error::{RelayError, Result};
use crate::pipeline::ObservationPipeline;

/// Wait after a failed lookup before the next one.
const RESOLVE_RETRY: Duration = Duration::from_secs(5);
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Vendor endpoint, resolved by name and cached for a while.
///
/// At most one lookup runs per deadline, bounded by `lookup_timeout`. After a
/// failure the deadline moves `retry` ahead and the last good address is kept.
pub struct Upstream {
    host: String,
    port: u16,
    want_ipv4: bool,
    ttl: Duration,
    retry: Duration,
    lookup_timeout: Duration,
    cached: Option<SocketAddr>,
    next_lookup: Instant,
}

impl Upstream {
    pub fn new(host: impl Into<String>, port: u16, want_ipv4: bool, ttl: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            want_ipv4,
            ttl,
            retry: RESOLVE_RETRY,
            lookup_timeout: RESOLVE_TIMEOUT,
            cached: None,
            next_lookup: Instant::now(),
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub async fn resolve(&mut self) -> std::io::Result<SocketAddr> {
        let now = Instant::now();
        if now < self.next_lookup {
            return self.cached.ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} unresolved, next attempt in {:?}", self.host, self.next_lookup - now),
                )
            });
        }

        match self.lookup().await {
            Ok(addr) => {
                if self.cached != Some(addr) {
                    info!("Upstream {} resolved to {}", self.host, addr);
                }
                self.cached = Some(addr);
                self.next_lookup = Instant::now() + self.ttl;
                Ok(addr)
            }
            Err(e) => {
                self.next_lookup = Instant::now() + self.retry;
                match self.cached {
                    // keep relaying to the last known address
                    Some(stale) => {
                        warn!("Re-resolving {} failed ({}), reusing {}", self.host, e, stale);
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
        }
    }

    async fn lookup(&self) -> std::io::Result<SocketAddr> {
        let found = tokio::time::timeout(self.lookup_timeout, lookup_host((self.host.as_str(), self.port)))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("lookup of {} timed out after {:?}", self.host, self.lookup_timeout),
                )
            })??
            .find(|a| a.is_ipv4() == self.want_ipv4);

        found.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no usable address for {}", self.host),
            )
        })
    }
}

pub struct RelayEngine {
    device_side: UdpSocket,
    server_side: UdpSocket,
    device_addr: SocketAddr,
    upstream: Upstream,
    recv_buffer: usize,
    pipeline: ObservationPipeline,
}

impl RelayEngine {
    /// Binds both endpoints. Either port being taken is fatal.
    pub async fn bind(config: &RelayConfig, pipeline: ObservationPipeline) -> Result<Self> {
        let bind_ip: IpAddr = config
            .bind_host
            .parse()
            .map_err(|_| RelayError::Address(config.bind_host.clone()))?;
        let device_ip: IpAddr = config
            .device_ip
            .parse()
            .map_err(|_| RelayError::Address(config.device_ip.clone()))?;

        let device_side = bind_socket("device-facing", SocketAddr::new(bind_ip, config.device_listen_port)).await?;
        let server_side = bind_socket("server-facing", SocketAddr::new(bind_ip, config.server_listen_port)).await?;

        Ok(Self {
            device_side,
            server_side,
            device_addr: SocketAddr::new(device_ip, config.device_port),
            upstream: Upstream::new(
                config.upstream_host.clone(),
                config.upstream_port,
                bind_ip.is_ipv4(),
                Duration::from_secs(config.resolve_ttl_secs),
            )
            .with_lookup_timeout(Duration::from_millis(config.resolve_timeout_ms)),
            recv_buffer: config.recv_buffer.max(1),
            pipeline,
        })
    }

    pub fn device_side_addr(&self) -> std::io::Result<SocketAddr> {
        self.device_side.local_addr()
    }

    pub fn server_side_addr(&self) -> std::io::Result<SocketAddr> {
        self.server_side.local_addr()
    }

    /// Relays forever. One datagram is fully handled before the next is read.
    pub async fn run(mut self) {
        info!(
            "Relaying device {} <-> {}:{} (device side {:?}, server side {:?})",
            self.device_addr,
            self.upstream.host,
            self.upstream.port,
            self.device_side.local_addr().ok(),
            self.server_side.local_addr().ok(),
        );

        let mut device_buf = vec![0u8; self.recv_buffer];
        let mut server_buf = vec![0u8; self.recv_buffer];

        loop {
            let (origin, received) = tokio::select! {
                r = self.device_side.recv_from(&mut device_buf) => (Origin::Device, r),
                r = self.server_side.recv_from(&mut server_buf) => (Origin::Server, r),
            };

            let (len, peer) = match received {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("Receive on {} side failed: {}", origin.as_str(), e);
                    continue;
                }
            };

            let buf = match origin {
                Origin::Device => &device_buf,
                Origin::Server => &server_buf,
            };
            let frame = RawFrame::new(Bytes::copy_from_slice(&buf[..len]), peer, origin);

            let forwarded = self.forward(&frame).await;
            self.pipeline.observe(&frame, &forwarded);
        }
    }

    async fn forward(&mut self, frame: &RawFrame) -> Forwarded {
        let (socket, dest) = match frame.origin {
            Origin::Device => match self.upstream.resolve().await {
                Ok(dest) => (&self.server_side, dest),
                Err(e) => {
                    return Forwarded::Failed {
                        reason: format!("cannot resolve {}: {}", self.upstream.host, e),
                    }
                }
            },
            Origin::Server => (&self.device_side, self.device_addr),
        };

        match socket.send_to(&frame.bytes, dest).await {
            Ok(sent) if sent == frame.bytes.len() => {
                debug!("Forwarded {} bytes {} -> {}", sent, frame.peer, dest);
                Forwarded::Sent { to: dest }
            }
            Ok(sent) => Forwarded::Failed {
                reason: format!("short send to {}: {} of {} bytes", dest, sent, frame.bytes.len()),
            },
            Err(e) => Forwarded::Failed {
                reason: format!("send to {} failed: {}", dest, e),
            },
        }
    }
}

async fn bind_socket(role: &'static str, addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| RelayError::Bind { role, addr, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn upstream_resolves_literal_address() {
        let mut upstream = Upstream::new("127.0.0.1", 2001, true, TTL);
        let addr = upstream.resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:2001".parse().unwrap());
        assert!(upstream.next_lookup > Instant::now() + TTL - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn upstream_without_matching_family_fails() {
        let mut upstream = Upstream::new("127.0.0.1", 2001, false, TTL);
        assert!(upstream.resolve().await.is_err());
    }

    #[tokio::test]
    async fn failed_refresh_reuses_stale_address_until_retry_deadline() {
        let mut upstream = Upstream::new("127.0.0.1", 2001, true, Duration::from_millis(1));
        let first = upstream.resolve().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        upstream.host = "no-such-host.invalid".to_string();

        assert_eq!(upstream.resolve().await.unwrap(), first);
        let deadline = upstream.next_lookup;
        assert!(deadline > Instant::now());

        // within the retry window: no new lookup, same deadline
        for _ in 0..3 {
            assert_eq!(upstream.resolve().await.unwrap(), first);
            assert_eq!(upstream.next_lookup, deadline);
        }
    }

    #[tokio::test]
    async fn failed_first_lookup_is_not_retried_per_call() {
        let mut upstream = Upstream::new("no-such-host.invalid", 2001, true, TTL);
        assert!(upstream.resolve().await.is_err());
        let deadline = upstream.next_lookup;
        assert!(deadline > Instant::now());

        let err = upstream.resolve().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
        assert_eq!(upstream.next_lookup, deadline);
    }

    #[tokio::test]
    async fn slow_lookup_is_cut_off() {
        // a name (not a literal) goes through the blocking resolver, which
        // cannot answer within a zero timeout
        let mut upstream =
            Upstream::new("localhost", 2001, true, TTL).with_lookup_timeout(Duration::ZERO);
        let err = upstream.resolve().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn slow_lookup_falls_back_to_stale_address() {
        let mut upstream = Upstream::new("127.0.0.1", 2001, true, Duration::from_millis(1));
        let first = upstream.resolve().await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        upstream.host = "localhost".to_string();
        upstream.lookup_timeout = Duration::ZERO;

        assert_eq!(upstream.resolve().await.unwrap(), first);
    }
}
