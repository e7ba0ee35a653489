use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use super::{RecordSink, SinkError};
use crate::decoder::ProtocolRecord;

/// Storage sink backed by a single SQLite file.
///
/// The connection is owned by the relay loop and written synchronously, one
/// row per persisted record, before the next datagram is read.
pub struct SqliteRecordSink {
    conn: Connection,
}

impl SqliteRecordSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        init_db(&conn)?;

        info!("Record storage opened at {:?}", path);
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    // Columns are the union of every shape; a shape leaves the others NULL.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            ts INTEGER NOT NULL,
            src TEXT NOT NULL,
            dir TEXT,
            cmd TEXT,
            model TEXT,
            device_id TEXT,
            unk4 TEXT,
            power TEXT,
            status TEXT,
            wait TEXT,
            light TEXT,
            sleep_mode TEXT,
            sleep_time TEXT,
            lock TEXT,
            cs_code TEXT,
            y_code TEXT,
            ack_num TEXT,
            msg_num TEXT,
            chksum TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_device_ts ON messages (device_id, ts)",
        [],
    )?;

    Ok(())
}

impl RecordSink for SqliteRecordSink {
    fn persist(&mut self, record: &ProtocolRecord) -> Result<(), SinkError> {
        let c = record.columns();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO messages (
                ts, src, dir, cmd, model, device_id, unk4, power, status, wait, light,
                sleep_mode, sleep_time, lock, cs_code, y_code, ack_num, msg_num, chksum
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        )?;

        stmt.execute(params![
            c.ts,
            c.src,
            c.dir,
            c.cmd,
            c.model,
            c.device_id,
            c.unk4,
            c.power,
            c.status,
            c.wait,
            c.light,
            c.sleep_mode,
            c.sleep_time,
            c.lock,
            c.cs_code,
            c.y_code,
            c.ack_num,
            c.msg_num,
            c.chksum,
        ])?;

        Ok(())
    }
}
