//! Frame classifier: text frame + origin -> typed record
//!
//! Frames are comma separated with no escaping. The shape is chosen by origin,
//! then field count; ack shapes additionally require a literal `AOK`/`NOK` in
//! field 0 and are tried before any generic shape of the same width. Fields
//! are kept as text; nothing here fails, an unmatched frame is `Shape::Unknown`.

use super::lexicon::status_or_unknown;
use super::record::{
    DeviceAck, DeviceShort, DeviceStatus, Origin, ProtocolRecord, ServerAck, ServerCommand, Shape,
};

pub const FIELD_DELIMITER: char = ',';

/// Width of the sleep-mode prefix inside the combined sleep field (`SM1` + time).
pub const SLEEP_MODE_WIDTH: usize = 3;

const DEVICE_STATUS_FIELDS: usize = 12;
const DEVICE_SHORT_FIELDS: usize = 6;
const DEVICE_ACK_FIELDS: usize = 5;
const SERVER_COMMAND_FIELDS: usize = 5;
const SERVER_ACK_FIELDS: usize = 2;

pub fn classify(origin: Origin, text: &str, ts: i64) -> ProtocolRecord {
    let parts: Vec<&str> = text.split(FIELD_DELIMITER).collect();

    let shape = match origin {
        Origin::Device => classify_device(&parts),
        Origin::Server => classify_server(&parts),
    }
    .unwrap_or_else(|| Shape::Unknown {
        raw: text.to_string(),
    });

    ProtocolRecord {
        ts,
        src: origin,
        shape,
    }
}

fn classify_device(parts: &[&str]) -> Option<Shape> {
    if parts.len() == DEVICE_ACK_FIELDS && is_ack_token(parts[0]) {
        return Some(Shape::DeviceAck(DeviceAck {
            cmd: parts[0].to_string(),
            device_id: parts[1].to_string(),
            ack_num: parts[2].to_string(),
            msg_num: parts[3].to_string(),
            chksum: parts[4].to_string(),
        }));
    }

    match parts.len() {
        DEVICE_STATUS_FIELDS => {
            let (dir, model) = split_marker(parts[0]);
            let (sleep_mode, sleep_time) = split_sleep(parts[7]);
            let entry = status_or_unknown(parts[4]);

            Some(Shape::DeviceStatus(DeviceStatus {
                dir,
                model,
                device_id: parts[1].to_string(),
                unk4: parts[2].to_string(),
                power: parts[3].to_string(),
                status: parts[4].to_string(),
                wait: parts[5].to_string(),
                light: parts[6].to_string(),
                sleep_mode,
                sleep_time,
                lock: parts[8].to_string(),
                cs_code: parts[9].to_string(),
                msg_num: parts[10].to_string(),
                chksum: parts[11].to_string(),
                error: entry.error,
                desc: entry.description.to_string(),
            }))
        }
        DEVICE_SHORT_FIELDS => {
            let (dir, model) = split_marker(parts[0]);

            Some(Shape::DeviceShort(DeviceShort {
                dir,
                model,
                device_id: parts[1].to_string(),
                unk4: parts[2].to_string(),
                y_code: parts[3].to_string(),
                msg_num: parts[4].to_string(),
                chksum: parts[5].to_string(),
            }))
        }
        _ => None,
    }
}

fn classify_server(parts: &[&str]) -> Option<Shape> {
    if parts.len() == SERVER_ACK_FIELDS && is_ack_token(parts[0]) {
        return Some(Shape::ServerAck(ServerAck {
            cmd: parts[0].to_string(),
            device_id: parts[1].to_string(),
        }));
    }

    match parts.len() {
        SERVER_COMMAND_FIELDS => {
            let (dir, cmd) = split_marker(parts[0]);

            Some(Shape::ServerCommand(ServerCommand {
                dir,
                cmd,
                model: parts[1].to_string(),
                device_id: parts[2].to_string(),
                msg_num: parts[3].to_string(),
                chksum: parts[4].to_string(),
            }))
        }
        _ => None,
    }
}

fn is_ack_token(field: &str) -> bool {
    field == "AOK" || field == "NOK"
}

/// `">model123"` -> (`">"`, `"model123"`).
fn split_marker(field: &str) -> (String, String) {
    let cut = field.chars().next().map_or(0, char::len_utf8);
    let (marker, rest) = field.split_at(cut);
    (marker.to_string(), rest.to_string())
}

/// Fixed-width slice, not a further split: `"SM123:34:01"` -> (`"SM1"`, `"23:34:01"`).
fn split_sleep(field: &str) -> (String, String) {
    let cut = field
        .char_indices()
        .nth(SLEEP_MODE_WIDTH)
        .map_or(field.len(), |(idx, _)| idx);
    let (mode, time) = field.split_at(cut);
    (mode.to_string(), time.to_string())
}
