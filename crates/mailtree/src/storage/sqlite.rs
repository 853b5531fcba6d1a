//! SQLite-backed mail tree store

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use serde::Serialize;

use super::QueryCounter;
use super::schema;
use crate::config::StoreConfig;
use crate::content::{ContentStore, SweepStats};
use crate::error::{Result, StoreError};
use crate::export::{self, ExportBatch, ExportFailure};
use crate::ingest;
use crate::mime::{MessagePart, MimePart};
use crate::models::{Body, Email, EmailFlags, EmailId, NodeKind, TreeId};
use crate::tree::{ForestQuery, Forest, KindRegistry, TreeStore};

/// Row counts per table, for maintenance output
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub emails: u64,
    pub parts: u64,
    pub bodies: u64,
    pub header_names: u64,
    pub header_data: u64,
    pub header_entries: u64,
}

/// Handles available inside a [`SqliteMailTree::write`] or
/// [`SqliteMailTree::read`] transaction
pub struct StoreTx<'a> {
    conn: &'a Connection,
    registry: &'a KindRegistry,
    counter: &'a QueryCounter,
    config: &'a StoreConfig,
}

impl<'a> StoreTx<'a> {
    pub fn tree(&self) -> TreeStore<'a> {
        TreeStore::new(self.conn, self.registry, self.counter, self.config.insert_mode)
    }

    pub fn content(&self) -> ContentStore<'a> {
        ContentStore::new(self.conn, self.counter, self.config.compression_level)
    }

    pub fn config(&self) -> &'a StoreConfig {
        self.config
    }

    pub fn registry(&self) -> &'a KindRegistry {
        self.registry
    }

    pub fn email(&self, id: EmailId) -> Result<Option<Email>> {
        self.counter.bump();
        let email = self
            .conn
            .query_row(
                "SELECT id, inbox, received_at, flags FROM emails WHERE id = ?",
                [id.get()],
                email_from_row,
            )
            .optional()?;
        Ok(email)
    }

    pub(crate) fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub(crate) fn counter(&self) -> &'a QueryCounter {
        self.counter
    }
}

/// Mail tree storage over one SQLite connection
///
/// Writes run in `BEGIN IMMEDIATE` transactions, so the database write lock
/// orders concurrent writers. Other processes may open the same file; WAL
/// keeps their readers on a consistent snapshot.
pub struct SqliteMailTree {
    conn: Mutex<Connection>,
    registry: KindRegistry,
    config: StoreConfig,
    counter: QueryCounter,
}

impl SqliteMailTree {
    /// Open (or create) the database at `path` and run migrations
    pub fn open(
        path: impl AsRef<Path>,
        config: StoreConfig,
        registry: KindRegistry,
    ) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened mail tree database at {:?}", path.as_ref());
        Self::with_connection(conn, config, registry)
    }

    pub fn open_in_memory(config: StoreConfig, registry: KindRegistry) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config, registry)
    }

    /// Open the database the config points at, with the default kinds
    pub fn from_config(config: StoreConfig) -> anyhow::Result<Self> {
        let path = config.resolve_db_path()?;
        Self::open(&path, config, KindRegistry::default())
            .with_context(|| format!("Failed to open mail tree database at {:?}", path))
    }

    fn with_connection(
        mut conn: Connection,
        config: StoreConfig,
        registry: KindRegistry,
    ) -> Result<Self> {
        schema::set_busy_timeout(&conn, config.busy_timeout())?;
        schema::prepare(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            config,
            counter: QueryCounter::default(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Statements issued so far through this store
    pub fn query_count(&self) -> u64 {
        self.counter.get()
    }

    /// Run `f` in an immediate write transaction, committing on `Ok`
    pub fn write<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&self.store_tx(&tx))?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` against a read snapshot
    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&self.store_tx(&tx))?;
        Ok(value)
    }

    fn store_tx<'a>(&'a self, conn: &'a Connection) -> StoreTx<'a> {
        StoreTx {
            conn,
            registry: &self.registry,
            counter: &self.counter,
            config: &self.config,
        }
    }

    /// Parse and store a raw message
    pub fn ingest(&self, raw: &[u8], inbox: &str, received_at: DateTime<Utc>) -> Result<EmailId> {
        let parsed = ingest::parse_message(raw)?;
        self.ingest_parsed(&parsed, inbox, received_at)
    }

    pub fn ingest_parsed<P: MimePart>(
        &self,
        message: &P,
        inbox: &str,
        received_at: DateTime<Utc>,
    ) -> Result<EmailId> {
        self.write(|tx| ingest::ingest_message(tx, message, inbox, received_at))
    }

    pub fn reconstruct(&self, email: EmailId) -> Result<MessagePart> {
        self.read(|tx| export::reconstruct(tx, email))
    }

    /// Rebuild each email in turn. A failing email is recorded and the
    /// batch carries on.
    pub fn export_batch(&self, ids: &[EmailId]) -> ExportBatch {
        let mut batch = ExportBatch::default();
        for &id in ids {
            match self.read(|tx| export::export_email(tx, id)) {
                Ok(exported) => batch.messages.push(exported),
                Err(error) => {
                    warn!("Skipping email {} in export: {}", id.to_hex(), error);
                    batch.failures.push(ExportFailure { email: id, error });
                }
            }
        }
        debug!("Exported {} of {} emails", batch.messages.len(), ids.len());
        batch
    }

    /// Fetch one whole tree of any registered kind
    pub fn fetch_tree(&self, tree_id: TreeId, kind: &NodeKind) -> Result<Forest> {
        self.read(|tx| {
            tx.tree()
                .fetch_whole_forest(&ForestQuery::kind(kind.clone()).tree(tree_id))
        })
    }

    /// Delete unreferenced content older than the configured grace period
    pub fn sweep_orphans(&self) -> Result<SweepStats> {
        let grace = chrono::Duration::from_std(self.config.orphan_grace())
            .map_err(|e| StoreError::invalid(format!("orphan grace period: {}", e)))?;
        let cutoff = Utc::now() - grace;

        let stats = self.write(|tx| tx.content().sweep_orphans_before(cutoff))?;
        info!(
            "Swept {} orphaned rows ({} bodies, {} header values, {} header names)",
            stats.total(),
            stats.bodies,
            stats.header_data,
            stats.header_names
        );
        Ok(stats)
    }

    pub fn get_email(&self, id: EmailId) -> Result<Option<Email>> {
        self.read(|tx| tx.email(id))
    }

    /// Email ids in `inbox`, oldest first
    pub fn list_email_ids(&self, inbox: &str) -> Result<Vec<EmailId>> {
        self.read(|tx| {
            tx.counter.bump();
            let mut stmt = tx
                .conn
                .prepare("SELECT id FROM emails WHERE inbox = ? ORDER BY received_at, id")?;
            let ids = stmt
                .query_map([inbox], |row| row.get(0).map(EmailId))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn set_flags(&self, id: EmailId, flags: EmailFlags) -> Result<()> {
        self.write(|tx| {
            tx.counter.bump();
            let updated = tx.conn.execute(
                "UPDATE emails SET flags = ? WHERE id = ?",
                params![flags.bits(), id.get()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("email {}", id)));
            }
            Ok(())
        })
    }

    /// Remove an email and its part tree. Content rows stay until the
    /// next sweep.
    pub fn delete_email(&self, id: EmailId) -> Result<bool> {
        self.write(|tx| {
            let nodes = tx.tree().delete_tree(id.tree_id(), &NodeKind::part())?;
            tx.counter.bump();
            let deleted = tx.conn.execute("DELETE FROM emails WHERE id = ?", [id.get()])?;
            if deleted > 0 {
                debug!("Deleted email {} ({} parts)", id, nodes);
            }
            Ok(deleted > 0)
        })
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        self.read(|tx| {
            tx.counter.bump();
            let counts = tx.conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM emails),
                    (SELECT COUNT(*) FROM part_lists),
                    (SELECT COUNT(*) FROM bodies),
                    (SELECT COUNT(*) FROM header_names),
                    (SELECT COUNT(*) FROM header_data),
                    (SELECT COUNT(*) FROM header_entries)",
                [],
                |row| {
                    Ok(StoreCounts {
                        emails: row.get(0)?,
                        parts: row.get(1)?,
                        bodies: row.get(2)?,
                        header_names: row.get(3)?,
                        header_data: row.get(4)?,
                        header_entries: row.get(5)?,
                    })
                },
            )?;
            Ok(counts)
        })
    }

    /// Store a body on its own, outside any ingest
    pub fn intern_body(&self, payload: &[u8]) -> Result<Body> {
        self.write(|tx| tx.content().intern_body(payload))
    }
}

fn email_from_row(row: &Row<'_>) -> rusqlite::Result<Email> {
    let received_at: String = row.get(2)?;
    let received_at = DateTime::parse_from_rfc3339(&received_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(Email {
        id: EmailId(row.get(0)?),
        inbox: row.get(1)?,
        received_at,
        flags: EmailFlags::from_bits_truncate(row.get(3)?),
    })
}
