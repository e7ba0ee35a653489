use crate::decoder::{ProtocolRecord, Shape};

/// Where a record is published, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub persist: bool,
    pub publish: Option<Publication>,
}

#[derive(Debug, Clone)]
pub struct PolicySettings {
    pub namespace: String,
    /// Also publish server acks (non-retained) on `<namespace>/<device_id>/server`.
    pub publish_server_acks: bool,
}

pub fn status_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/{}/status", namespace, device_id)
}

pub fn server_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/{}/server", namespace, device_id)
}

/// Persist/publish decision per shape.
///
/// | Shape         | Persist | Publish                        |
/// |---------------|---------|--------------------------------|
/// | DeviceStatus  | yes     | `<ns>/<id>/status`, retained   |
/// | DeviceShort   | yes     | no                             |
/// | DeviceAck     | yes     | no                             |
/// | ServerCommand | yes     | no                             |
/// | ServerAck     | no      | opt-in, `<ns>/<id>/server`     |
/// | Unknown       | no      | no                             |
pub fn disposition(record: &ProtocolRecord, settings: &PolicySettings) -> Disposition {
    match &record.shape {
        Shape::DeviceStatus(status) => Disposition {
            persist: true,
            publish: Some(Publication {
                topic: status_topic(&settings.namespace, &status.device_id),
                retain: true,
            }),
        },
        Shape::DeviceShort(_) | Shape::DeviceAck(_) | Shape::ServerCommand(_) => Disposition {
            persist: true,
            publish: None,
        },
        Shape::ServerAck(ack) => Disposition {
            persist: false,
            publish: settings.publish_server_acks.then(|| Publication {
                topic: server_topic(&settings.namespace, &ack.device_id),
                retain: false,
            }),
        },
        Shape::Unknown { .. } => Disposition {
            persist: false,
            publish: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{classify, Origin};

    fn settings(publish_server_acks: bool) -> PolicySettings {
        PolicySettings {
            namespace: "litter_robot".into(),
            publish_server_acks,
        }
    }

    fn decide(origin: Origin, text: &str, publish_server_acks: bool) -> Disposition {
        disposition(&classify(origin, text, 0), &settings(publish_server_acks))
    }

    #[test]
    fn device_status_is_persisted_and_published_retained() {
        let d = decide(
            Origin::Device,
            ">model123,5c3f312af824b9,H,AC,Rdy,W7,NL1,SM0,PL0,CS00E3,0710,00D28BBA",
            false,
        );
        assert!(d.persist);
        assert_eq!(
            d.publish,
            Some(Publication {
                topic: "litter_robot/5c3f312af824b9/status".into(),
                retain: true,
            })
        );
    }

    #[test]
    fn data_frames_are_persisted_only() {
        for (origin, text) in [
            (Origin::Device, ">model123,5c3f312af824b9,H,Y01,0713,00D28BBD"),
            (Origin::Device, "AOK,5c3f312af824b9,001,0712,00D28BBC"),
            (Origin::Server, ">C,modelX,5c3f312af824b9,0711,00D28BBB"),
        ] {
            let d = decide(origin, text, true);
            assert!(d.persist, "{text}");
            assert_eq!(d.publish, None, "{text}");
        }
    }

    #[test]
    fn server_ack_is_dropped_unless_opted_in() {
        let off = decide(Origin::Server, "AOK,5c3f312af824b9", false);
        assert_eq!(off, Disposition { persist: false, publish: None });

        let on = decide(Origin::Server, "AOK,5c3f312af824b9", true);
        assert!(!on.persist);
        assert_eq!(
            on.publish,
            Some(Publication {
                topic: "litter_robot/5c3f312af824b9/server".into(),
                retain: false,
            })
        );
    }

    #[test]
    fn unknown_is_neither_persisted_nor_published() {
        let d = decide(Origin::Device, "a,b,c,d,e,f,g", true);
        assert_eq!(d, Disposition { persist: false, publish: None });
    }
}
