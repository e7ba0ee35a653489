//! Decoded protocol records
//!
//! A `ProtocolRecord` is the typed view of one text frame. The frame layout is
//! discriminated by `Shape`, a closed enum: adding a shape is a compiler-checked
//! change everywhere a record is consumed (storage columns, publish policy).

use serde::Serialize;

/// Which socket a frame arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    /// Received on the device-facing socket: the litter box is talking.
    #[serde(rename = "robot")]
    Device,
    /// Received on the server-facing socket: the vendor cloud is talking.
    #[serde(rename = "server")]
    Server,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Device => "robot",
            Origin::Server => "server",
        }
    }
}

/// 12-field periodic status report sent by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub dir: String,
    pub model: String,
    pub device_id: String,
    pub unk4: String,
    pub power: String,
    pub status: String,
    pub wait: String,
    pub light: String,
    pub sleep_mode: String,
    pub sleep_time: String,
    pub lock: String,
    pub cs_code: String,
    pub msg_num: String,
    pub chksum: String,
    pub error: bool,
    pub desc: String,
}

/// 6-field device frame carrying an opaque code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceShort {
    pub dir: String,
    pub model: String,
    pub device_id: String,
    pub unk4: String,
    pub y_code: String,
    pub msg_num: String,
    pub chksum: String,
}

/// Device acknowledgement of a server command (`AOK` / `NOK`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceAck {
    pub cmd: String,
    pub device_id: String,
    pub ack_num: String,
    pub msg_num: String,
    pub chksum: String,
}

/// Command pushed by the vendor server to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerCommand {
    pub dir: String,
    pub cmd: String,
    pub model: String,
    pub device_id: String,
    pub msg_num: String,
    pub chksum: String,
}

/// Server acknowledgement of a device frame (`AOK` / `NOK`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerAck {
    pub cmd: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    DeviceStatus(DeviceStatus),
    DeviceShort(DeviceShort),
    DeviceAck(DeviceAck),
    ServerCommand(ServerCommand),
    ServerAck(ServerAck),
    Unknown { raw: String },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::DeviceStatus(_) => "device_status",
            Shape::DeviceShort(_) => "device_short",
            Shape::DeviceAck(_) => "device_ack",
            Shape::ServerCommand(_) => "server_command",
            Shape::ServerAck(_) => "server_ack",
            Shape::Unknown { .. } => "unknown",
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Shape::DeviceStatus(s) => Some(&s.device_id),
            Shape::DeviceShort(s) => Some(&s.device_id),
            Shape::DeviceAck(s) => Some(&s.device_id),
            Shape::ServerCommand(s) => Some(&s.device_id),
            Shape::ServerAck(s) => Some(&s.device_id),
            Shape::Unknown { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolRecord {
    /// Capture time, seconds since the Unix epoch.
    pub ts: i64,
    pub src: Origin,
    #[serde(flatten)]
    pub shape: Shape,
}

impl ProtocolRecord {
    pub fn is_unknown(&self) -> bool {
        matches!(self.shape, Shape::Unknown { .. })
    }

    /// Flattens the record onto the storage schema. Columns the shape does not
    /// carry stay `None` and are written as NULL.
    pub fn columns(&self) -> Columns<'_> {
        let mut c = Columns {
            ts: self.ts,
            src: self.src.as_str(),
            ..Columns::default()
        };

        match &self.shape {
            Shape::DeviceStatus(s) => {
                c.dir = Some(&s.dir);
                c.model = Some(&s.model);
                c.device_id = Some(&s.device_id);
                c.unk4 = Some(&s.unk4);
                c.power = Some(&s.power);
                c.status = Some(&s.status);
                c.wait = Some(&s.wait);
                c.light = Some(&s.light);
                c.sleep_mode = Some(&s.sleep_mode);
                c.sleep_time = Some(&s.sleep_time);
                c.lock = Some(&s.lock);
                c.cs_code = Some(&s.cs_code);
                c.msg_num = Some(&s.msg_num);
                c.chksum = Some(&s.chksum);
            }
            Shape::DeviceShort(s) => {
                c.dir = Some(&s.dir);
                c.model = Some(&s.model);
                c.device_id = Some(&s.device_id);
                c.unk4 = Some(&s.unk4);
                c.y_code = Some(&s.y_code);
                c.msg_num = Some(&s.msg_num);
                c.chksum = Some(&s.chksum);
            }
            Shape::DeviceAck(s) => {
                c.cmd = Some(&s.cmd);
                c.device_id = Some(&s.device_id);
                c.ack_num = Some(&s.ack_num);
                c.msg_num = Some(&s.msg_num);
                c.chksum = Some(&s.chksum);
            }
            Shape::ServerCommand(s) => {
                c.dir = Some(&s.dir);
                c.cmd = Some(&s.cmd);
                c.model = Some(&s.model);
                c.device_id = Some(&s.device_id);
                c.msg_num = Some(&s.msg_num);
                c.chksum = Some(&s.chksum);
            }
            Shape::ServerAck(s) => {
                c.cmd = Some(&s.cmd);
                c.device_id = Some(&s.device_id);
            }
            Shape::Unknown { .. } => {}
        }

        c
    }
}

/// Borrowed row for the append-only `messages` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns<'a> {
    pub ts: i64,
    pub src: &'a str,
    pub dir: Option<&'a str>,
    pub cmd: Option<&'a str>,
    pub model: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub unk4: Option<&'a str>,
    pub power: Option<&'a str>,
    pub status: Option<&'a str>,
    pub wait: Option<&'a str>,
    pub light: Option<&'a str>,
    pub sleep_mode: Option<&'a str>,
    pub sleep_time: Option<&'a str>,
    pub lock: Option<&'a str>,
    pub cs_code: Option<&'a str>,
    pub y_code: Option<&'a str>,
    pub ack_num: Option<&'a str>,
    pub msg_num: Option<&'a str>,
    pub chksum: Option<&'a str>,
}
