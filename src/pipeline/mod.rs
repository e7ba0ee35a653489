//! Observation pipeline: everything that happens to a datagram after it has
//! been relayed.
//!
//! Decode, classify, audit, then persist and/or publish according to
//! `policy::disposition`. Nothing in here can fail the relay: sink errors are
//! logged and the record is given up on.

pub mod policy;

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::PublishConfig;
use crate::decoder::{classify, lookup_command, Origin, ProtocolRecord, Shape};
use crate::relay::{Forwarded, RawFrame};
use crate::sinks::{AuditEvent, AuditLog, LastWill, PublishSink, RecordSink};

pub use policy::{disposition, Disposition, PolicySettings, Publication};

/// The collaborators a pipeline writes to. Each one is optional.
#[derive(Default)]
pub struct Sinks {
    pub storage: Option<Box<dyn RecordSink>>,
    pub publisher: Option<Arc<dyn PublishSink>>,
    pub audit: Option<AuditLog>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub namespace: String,
    /// Device announced in the last will; the will topic falls back to
    /// `<namespace>/status` without it.
    pub device_id: Option<String>,
    pub publish_server_acks: bool,
}

impl From<&PublishConfig> for PipelineSettings {
    fn from(config: &PublishConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            device_id: config.device_id.clone(),
            publish_server_acks: config.publish_server_acks,
        }
    }
}

impl PipelineSettings {
    /// Whether the will lands on the per-device status topic that
    /// `<namespace>/+/status` subscribers watch.
    pub fn will_is_device_scoped(&self) -> bool {
        self.device_id.is_some()
    }

    pub fn last_will(&self) -> LastWill {
        let topic = match &self.device_id {
            Some(id) => policy::status_topic(&self.namespace, id),
            None => format!("{}/status", self.namespace),
        };
        let payload = json!({
            "src": "relay",
            "device_id": self.device_id,
            "status": "MIA",
            "error": true,
            "desc": "Missing in action",
        });

        LastWill {
            topic,
            payload: Bytes::from(payload.to_string()),
            retain: true,
        }
    }
}

pub struct ObservationPipeline {
    policy: PolicySettings,
    sinks: Sinks,
}

impl ObservationPipeline {
    /// Registers the last will with the publish sink, once, for the lifetime
    /// of the pipeline.
    pub fn new(settings: PipelineSettings, sinks: Sinks) -> Self {
        if let Some(publisher) = &sinks.publisher {
            let will = settings.last_will();
            if !settings.will_is_device_scoped() {
                warn!(
                    "PUBLISH_DEVICE_ID is not set: last will goes to {}, which {}/+/status subscribers do not see",
                    will.topic, settings.namespace
                );
            }
            info!("Registering last will on {}", will.topic);
            if let Err(e) = publisher.set_last_will(will) {
                warn!("Could not register last will: {}", e);
            }
        }

        Self {
            policy: PolicySettings {
                namespace: settings.namespace,
                publish_server_acks: settings.publish_server_acks,
            },
            sinks,
        }
    }

    /// Handles one relayed datagram. Returns the record when the bytes were
    /// valid text.
    pub fn observe(&mut self, frame: &RawFrame, forwarded: &Forwarded) -> Option<ProtocolRecord> {
        let (inbound, outbound) = match frame.origin {
            Origin::Device => (AuditEvent::FromRobot, AuditEvent::ToServer),
            Origin::Server => (AuditEvent::FromServer, AuditEvent::ToRobot),
        };

        if let Forwarded::Failed { reason } = forwarded {
            warn!(
                "{} datagram from {} not forwarded: {}",
                frame.origin.as_str(),
                frame.peer,
                reason
            );
        }

        let text = match frame.decode() {
            Ok(text) => text,
            Err(e) => {
                warn!("Decode error: {}", e);
                if let Some(audit) = self.sinks.audit.as_mut() {
                    audit.decode_error(frame.peer, inbound, &e.hex);
                    audit.record(frame.peer, outbound, forwarded.is_sent(), &e.hex);
                }
                return None;
            }
        };

        if let Some(audit) = self.sinks.audit.as_mut() {
            audit.record(frame.peer, inbound, true, text.as_str());
            audit.record(frame.peer, outbound, forwarded.is_sent(), text.as_str());
        }
        if let Forwarded::Sent { to } = forwarded {
            debug!("{} -> {}: {}", frame.peer, to, text.as_str());
        }

        let record = classify(frame.origin, text.as_str(), Utc::now().timestamp());
        self.dispatch(&record);
        Some(record)
    }

    fn dispatch(&mut self, record: &ProtocolRecord) {
        log_record(record);

        let decision = disposition(record, &self.policy);

        if decision.persist {
            if let Some(storage) = self.sinks.storage.as_mut() {
                if let Err(e) = storage.persist(record) {
                    warn!("Persisting {} record failed: {}", record.shape.name(), e);
                }
            }
        }

        let (Some(publication), Some(publisher)) = (decision.publish, &self.sinks.publisher) else {
            return;
        };
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!("Encoding {} record failed: {}", record.shape.name(), e);
                return;
            }
        };
        if let Err(e) = publisher.publish(&publication.topic, payload, publication.retain) {
            warn!("Publishing to {} failed: {}", publication.topic, e);
        }
    }
}

fn log_record(record: &ProtocolRecord) {
    let src = record.src.as_str();
    match &record.shape {
        Shape::DeviceStatus(s) => info!(
            "[{}] {} status {} ({}) error={}",
            src, s.device_id, s.status, s.desc, s.error
        ),
        Shape::DeviceShort(s) => info!("[{}] {} code {}", src, s.device_id, s.y_code),
        Shape::DeviceAck(s) => info!(
            "[{}] {} {} ack {} ({})",
            src,
            s.device_id,
            s.cmd,
            s.ack_num,
            lookup_command(&s.cmd).unwrap_or("?")
        ),
        Shape::ServerCommand(s) => info!(
            "[{}] {} command {} ({})",
            src,
            s.device_id,
            s.cmd,
            lookup_command(&s.cmd).unwrap_or("unknown command")
        ),
        Shape::ServerAck(s) => info!("[{}] {} {}", src, s.device_id, s.cmd),
        Shape::Unknown { raw } => info!("[{}] unrecognised frame: {}", src, raw),
    }
}
