//! Content-addressed storage for bodies and header values
//!
//! Identical content is stored once. Each `intern_*` call is a single
//! atomic insert-or-reread against the uniqueness constraint, so two
//! writers racing on the same bytes both end up with the winner's row.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::models::{Body, BodyId, ContentHash, HeaderData, HeaderDataId, HeaderName, HeaderNameId};
use crate::storage::QueryCounter;

/// Rows removed by an orphan sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub bodies: usize,
    pub header_data: usize,
    pub header_names: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.bodies + self.header_data + self.header_names
    }
}

pub struct ContentStore<'a> {
    conn: &'a Connection,
    counter: &'a QueryCounter,
    compression_level: i32,
}

impl<'a> ContentStore<'a> {
    pub fn new(conn: &'a Connection, counter: &'a QueryCounter, compression_level: i32) -> Self {
        Self {
            conn,
            counter,
            compression_level,
        }
    }

    /// Store `payload` unless identical bytes are already stored
    pub fn intern_body(&self, payload: &[u8]) -> Result<Body> {
        let hash = ContentHash::of(payload);
        let compressed =
            zstd::encode_all(payload, self.compression_level).map_err(StoreError::Compression)?;

        self.counter.bump();
        self.conn.execute(
            "INSERT INTO bodies (hash, payload, size, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(hash) DO NOTHING",
            params![hash.as_str(), compressed, payload.len() as i64, now()],
        )?;

        self.counter.bump();
        let (id, stored, size): (i64, String, i64) = self.conn.query_row(
            "SELECT id, hash, size FROM bodies WHERE hash = ?",
            [hash.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(Body {
            id: BodyId(id),
            hash: ContentHash::from_stored(stored),
            size: size as u64,
        })
    }

    /// Store a header value unless the same text is already stored
    pub fn intern_header_value(&self, text: &str) -> Result<HeaderData> {
        let hash = ContentHash::of(text.as_bytes());

        self.counter.bump();
        self.conn.execute(
            "INSERT INTO header_data (hash, text, created_at) VALUES (?, ?, ?)
             ON CONFLICT(hash) DO NOTHING",
            params![hash.as_str(), text, now()],
        )?;

        self.counter.bump();
        let id: i64 = self.conn.query_row(
            "SELECT id FROM header_data WHERE hash = ?",
            [hash.as_str()],
            |row| row.get(0),
        )?;

        Ok(HeaderData {
            id: HeaderDataId(id),
            hash,
        })
    }

    /// Look up or create a header name (exact, case-sensitive match)
    pub fn intern_header_name(&self, name: &str) -> Result<HeaderName> {
        self.counter.bump();
        self.conn.execute(
            "INSERT INTO header_names (name, created_at) VALUES (?, ?)
             ON CONFLICT(name) DO NOTHING",
            params![name, now()],
        )?;

        self.counter.bump();
        let id: i64 = self.conn.query_row(
            "SELECT id FROM header_names WHERE name = ?",
            [name],
            |row| row.get(0),
        )?;

        Ok(HeaderName {
            id: HeaderNameId(id),
            name: name.to_string(),
        })
    }

    /// Decompressed payload of a body, if the row exists
    pub fn load_body(&self, id: BodyId) -> Result<Option<Vec<u8>>> {
        self.counter.bump();
        let compressed: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT payload FROM bodies WHERE id = ?", [id.get()], |row| {
                row.get(0)
            })
            .optional()?;
        compressed.map(|data| decompress(&data)).transpose()
    }

    pub fn load_header_value(&self, id: HeaderDataId) -> Result<Option<String>> {
        self.counter.bump();
        let text = self
            .conn
            .query_row("SELECT text FROM header_data WHERE id = ?", [id.get()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(text)
    }

    pub fn load_header_name(&self, id: HeaderNameId) -> Result<Option<String>> {
        self.counter.bump();
        let name = self
            .conn
            .query_row("SELECT name FROM header_names WHERE id = ?", [id.get()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(name)
    }

    /// Delete unreferenced content created before `cutoff`.
    ///
    /// Rows newer than the cutoff are kept even when unreferenced, since an
    /// ingest may have interned them without linking them yet.
    pub fn sweep_orphans_before(&self, cutoff: DateTime<Utc>) -> Result<SweepStats> {
        let cutoff = cutoff.timestamp();

        self.counter.bump();
        let bodies = self.conn.execute(
            "DELETE FROM bodies WHERE created_at < ?
             AND NOT EXISTS (SELECT 1 FROM part_lists p WHERE p.body_id = bodies.id)",
            [cutoff],
        )?;

        self.counter.bump();
        let header_data = self.conn.execute(
            "DELETE FROM header_data WHERE created_at < ?
             AND NOT EXISTS (SELECT 1 FROM header_entries e WHERE e.data_id = header_data.id)",
            [cutoff],
        )?;

        self.counter.bump();
        let header_names = self.conn.execute(
            "DELETE FROM header_names WHERE created_at < ?
             AND NOT EXISTS (SELECT 1 FROM header_entries e WHERE e.name_id = header_names.id)",
            [cutoff],
        )?;

        Ok(SweepStats {
            bodies,
            header_data,
            header_names,
        })
    }
}

pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(StoreError::Compression)
}

fn now() -> i64 {
    Utc::now().timestamp()
}
