//! Publish sink: an MQTT client driven by its own background task
//!
//! `publish` only reads a flag and hands the message to the client's bounded
//! request channel, so the relay loop is never held up by the broker. The task
//! polls the `rumqttc` event loop, waits a fixed delay between failed
//! connection attempts and puts the current last will into every CONNECT.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    Request,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{LastWill, PublishSink, SinkError};
use crate::config::PublishConfig;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    will: Mutex<Option<LastWill>>,
}

pub struct MqttPublisher {
    client: AsyncClient,
    shared: Arc<Shared>,
    broker: String,
    reconnect: Duration,
    /// Event loop not yet handed to a task. It starts on first use, so a will
    /// registered before then is part of the very first CONNECT.
    idle: Mutex<Option<EventLoop>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    pub fn new(config: &PublishConfig) -> Self {
        let mut options = MqttOptions::new(
            config.client_name.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options
            .set_keep_alive(Duration::from_secs(config.keepalive_secs))
            .set_clean_session(true);
        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));

        Self {
            client,
            shared: Arc::new(Shared::default()),
            broker: format!("{}:{}", config.broker_host, config.broker_port),
            reconnect: Duration::from_millis(config.reconnect_ms),
            idle: Mutex::new(Some(eventloop)),
            task: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Clean shutdown: sends DISCONNECT so the broker discards the will.
    pub async fn close(&self) {
        let handle = self.task.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        if self.is_connected() {
            if let Err(e) = self.client.try_disconnect() {
                debug!("DISCONNECT not queued: {}", e);
            }
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_ok() {
                return;
            }
            warn!("MQTT link to {} did not close in time", self.broker);
        }
        handle.abort();
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    fn ensure_started(&self) -> Result<(), SinkError> {
        let runtime = Handle::try_current().map_err(|_| SinkError::Unavailable)?;
        if let Some(eventloop) = self.idle.lock().take() {
            let task = runtime.spawn(drive(
                eventloop,
                self.shared.clone(),
                self.broker.clone(),
                self.reconnect,
            ));
            *self.task.lock() = Some(task);
        }
        Ok(())
    }
}

impl Drop for MqttPublisher {
    /// Leaves without DISCONNECT, so the broker announces the will.
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl PublishSink for MqttPublisher {
    fn publish(&self, topic: &str, payload: Bytes, retain: bool) -> Result<(), SinkError> {
        self.ensure_started()?;
        if !self.is_connected() {
            return Err(SinkError::Unavailable);
        }
        if !rumqttc::valid_topic(topic) {
            return Err(SinkError::InvalidTopic(topic.to_string()));
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| match e {
                ClientError::TryRequest(_) => SinkError::Backlogged,
                ClientError::Request(_) => SinkError::Unavailable,
            })
    }

    /// Takes effect at the next CONNECT: immediately before the first use,
    /// otherwise on the next reconnect.
    fn set_last_will(&self, will: LastWill) -> Result<(), SinkError> {
        if !rumqttc::valid_topic(&will.topic) {
            return Err(SinkError::InvalidTopic(will.topic));
        }
        *self.shared.will.lock() = Some(will);
        self.ensure_started()
    }
}

async fn drive(mut eventloop: EventLoop, shared: Arc<Shared>, broker: String, reconnect: Duration) {
    apply_will(&mut eventloop, &shared);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker at {}", broker);
                shared.connected.store(true, Ordering::SeqCst);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnected from {}", broker);
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                shared.connected.store(false, Ordering::SeqCst);
                warn!("MQTT link to {} down: {}", broker, e);

                if eventloop.pending.iter().any(|r| matches!(r, Request::Disconnect(_))) {
                    break;
                }
                // stale readings are not replayed after a reconnect
                let dropped = eventloop
                    .pending
                    .iter()
                    .filter(|r| matches!(r, Request::Publish(_)))
                    .count();
                eventloop.pending.clear();
                if dropped > 0 {
                    warn!("Dropped {} publications queued when the link went down", dropped);
                }

                tokio::time::sleep(reconnect).await;
                apply_will(&mut eventloop, &shared);
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
}

fn apply_will(eventloop: &mut EventLoop, shared: &Shared) {
    if let Some(will) = shared.will.lock().as_ref() {
        eventloop.mqtt_options.set_last_will(rumqttc::LastWill::new(
            will.topic.clone(),
            will.payload.to_vec(),
            QoS::AtLeastOnce,
            will.retain,
        ));
    }
}
