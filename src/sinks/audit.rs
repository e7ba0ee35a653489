//! Plaintext audit trail of everything crossing the relay.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    FromRobot,
    ToServer,
    FromServer,
    ToRobot,
}

impl AuditEvent {
    pub fn label(&self) -> &'static str {
        match self {
            AuditEvent::FromRobot => "FROM_ROBOT",
            AuditEvent::ToServer => "TO_SERVER",
            AuditEvent::FromServer => "FROM_SERVER",
            AuditEvent::ToRobot => "TO_ROBOT",
        }
    }
}

pub struct AuditLog {
    file: File,
    path: PathBuf,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    pub fn record(&mut self, peer: SocketAddr, event: AuditEvent, ok: bool, text: &str) {
        let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        let line = format_line(&stamp, peer, event, ok, text);
        self.write_line(&line);
    }

    pub fn decode_error(&mut self, peer: SocketAddr, event: AuditEvent, hex: &str) {
        let line = format!(
            "{}: error parsing {} from {}",
            event.label().to_lowercase(),
            hex,
            peer
        );
        self.write_line(&line);
    }

    fn write_line(&mut self, line: &str) {
        let result = writeln!(self.file, "{}", line).and_then(|_| self.file.flush());
        if let Err(e) = result {
            warn!("Audit log write to {:?} failed: {}", self.path, e);
        }
    }
}

pub fn format_line(stamp: &str, peer: SocketAddr, event: AuditEvent, ok: bool, text: &str) -> String {
    format!(
        "{:<27} {:<16} {:>5} {:<11} {:<3} {}",
        stamp,
        peer.ip(),
        peer.port(),
        event.label(),
        if ok { "OK" } else { "ERR" },
        text
    )
}
