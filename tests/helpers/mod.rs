#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use litter_relay::config::{PublishConfig, RelayConfig};
use litter_relay::decoder::ProtocolRecord;
use litter_relay::sinks::{LastWill, PublishSink, RecordSink, SinkError};
use rumqttc::mqttbytes::{self, v4};
use rumqttc::{ConnAck, ConnectReturnCode, Packet, PingResp};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

// --- Fake sinks ---

/// Storage that keeps every persisted record in memory.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    pub rows: Arc<Mutex<Vec<ProtocolRecord>>>,
}

impl RecordingStorage {
    pub fn rows(&self) -> Vec<ProtocolRecord> {
        self.rows.lock().unwrap().clone()
    }
}

impl RecordSink for RecordingStorage {
    fn persist(&mut self, record: &ProtocolRecord) -> Result<(), SinkError> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// Publisher that records what it is asked to send. Starts online.
pub struct RecordingPublisher {
    pub published: Mutex<Vec<Published>>,
    pub will: Mutex<Option<LastWill>>,
    pub online: Mutex<bool>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            will: Mutex::new(None),
            online: Mutex::new(true),
        })
    }

    pub fn offline() -> Arc<Self> {
        let publisher = Self::new();
        *publisher.online.lock().unwrap() = false;
        publisher
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

impl PublishSink for RecordingPublisher {
    fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), SinkError> {
        if !*self.online.lock().unwrap() {
            return Err(SinkError::Unavailable);
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn set_last_will(&self, will: LastWill) -> Result<(), SinkError> {
        *self.will.lock().unwrap() = Some(will);
        Ok(())
    }
}

// --- Config builders ---

/// Relay bound to ephemeral loopback ports, aimed at the given fake peers.
pub fn relay_config(device: SocketAddr, upstream: SocketAddr) -> RelayConfig {
    RelayConfig {
        bind_host: "127.0.0.1".to_string(),
        device_listen_port: 0,
        server_listen_port: 0,
        device_ip: device.ip().to_string(),
        device_port: device.port(),
        upstream_host: upstream.ip().to_string(),
        upstream_port: upstream.port(),
        recv_buffer: 65535,
        resolve_ttl_secs: 300,
        resolve_timeout_ms: 2000,
    }
}

pub fn publish_config(broker_addr: SocketAddr) -> PublishConfig {
    PublishConfig {
        enabled: true,
        broker_host: broker_addr.ip().to_string(),
        broker_port: broker_addr.port(),
        namespace: "litter_robot".to_string(),
        client_name: "litter-relay-test".to_string(),
        device_id: Some("5c3f312af824b9".to_string()),
        keepalive_secs: 30,
        reconnect_ms: 100,
        channel_capacity: 64,
        publish_server_acks: false,
    }
}

// --- Network fixtures ---

pub async fn loopback_udp() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

pub async fn recv_datagram(socket: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 65535];
    let (len, from) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .expect("datagram not relayed in time")
        .unwrap();
    buf.truncate(len);
    (buf, from)
}

/// An address nothing is listening on.
pub async fn dead_tcp_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

// --- Fake MQTT broker ---

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected { client_id: String, will: Option<LastWill> },
    Published(Published),
    /// Client sent DISCONNECT.
    Disconnected,
    /// Socket closed without DISCONNECT; a real broker would fire the will.
    Dropped,
}

/// Accepts one MQTT 3.1.1 client at a time and records what it sends.
pub struct FakeBroker {
    pub addr: SocketAddr,
    events: Arc<Mutex<Vec<BrokerEvent>>>,
    kick: Arc<Notify>,
    _task: JoinHandle<()>,
}

impl FakeBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let kick = Arc::new(Notify::new());

        let task = tokio::spawn(serve(listener, events.clone(), kick.clone()));
        Self {
            addr,
            events,
            kick,
            _task: task,
        }
    }

    pub fn events(&self) -> Vec<BrokerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn connects(&self) -> Vec<Option<LastWill>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::Connected { will, .. } => Some(will),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<Published> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BrokerEvent::Published(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn saw(&self, event: &BrokerEvent) -> bool {
        self.events().contains(event)
    }

    /// Closes the current client connection from the broker side.
    pub fn drop_client(&self) {
        self.kick.notify_one();
    }
}

async fn serve(listener: TcpListener, events: Arc<Mutex<Vec<BrokerEvent>>>, kick: Arc<Notify>) {
    while let Ok((stream, _)) = listener.accept().await {
        serve_client(stream, &events, &kick).await;
    }
}

async fn serve_client(mut stream: TcpStream, events: &Mutex<Vec<BrokerEvent>>, kick: &Notify) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        loop {
            match v4::read(&mut buf, 64 * 1024) {
                Ok(packet) => {
                    if !answer(packet, &mut stream, events).await {
                        return;
                    }
                }
                Err(mqttbytes::Error::InsufficientBytes(_)) => break,
                Err(_) => return,
            }
        }

        tokio::select! {
            read = stream.read_buf(&mut buf) => match read {
                Ok(0) | Err(_) => {
                    events.lock().unwrap().push(BrokerEvent::Dropped);
                    return;
                }
                Ok(_) => {}
            },
            _ = kick.notified() => return,
        }
    }
}

/// Records `packet` and replies where MQTT requires it. `false` ends the session.
async fn answer(packet: Packet, stream: &mut TcpStream, events: &Mutex<Vec<BrokerEvent>>) -> bool {
    let mut reply = BytesMut::new();
    match packet {
        Packet::Connect(connect) => {
            events.lock().unwrap().push(BrokerEvent::Connected {
                client_id: connect.client_id,
                will: connect.last_will.map(|w| LastWill {
                    topic: w.topic,
                    payload: w.message,
                    retain: w.retain,
                }),
            });
            ConnAck::new(ConnectReturnCode::Success, false)
                .write(&mut reply)
                .unwrap();
        }
        Packet::Publish(publish) => {
            events.lock().unwrap().push(BrokerEvent::Published(Published {
                topic: publish.topic,
                payload: publish.payload,
                retain: publish.retain,
            }));
        }
        Packet::PingReq => {
            PingResp.write(&mut reply).unwrap();
        }
        Packet::Disconnect => {
            events.lock().unwrap().push(BrokerEvent::Disconnected);
            return false;
        }
        _ => {}
    }

    reply.is_empty() || stream.write_all(&reply).await.is_ok()
}

/// Polls `condition` until it holds or `WAIT` elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
