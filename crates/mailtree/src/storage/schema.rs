//! Database schema and connection setup

use std::time::Duration;

use log::info;
use rusqlite::Connection;
use rusqlite_migration::{M, Migrations};

use crate::error::Result;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Nested-set nodes for every hierarchy (email parts, pages)
            CREATE TABLE tree_nodes (
                id INTEGER PRIMARY KEY,
                tree_base TEXT NOT NULL,
                tree_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                parent_id INTEGER REFERENCES tree_nodes(id) ON DELETE CASCADE,
                lft INTEGER NOT NULL CHECK (lft > 0),
                rght INTEGER NOT NULL CHECK (rght > lft),
                level INTEGER NOT NULL CHECK (level >= 0)
            );

            CREATE INDEX idx_tree_nodes_tree ON tree_nodes(tree_base, tree_id, lft);
            CREATE INDEX idx_tree_nodes_parent ON tree_nodes(parent_id);

            -- One root per tree
            CREATE UNIQUE INDEX idx_tree_nodes_root
                ON tree_nodes(tree_base, tree_id) WHERE parent_id IS NULL;

            -- Content-addressed bodies, zstd compressed
            CREATE TABLE bodies (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                payload BLOB NOT NULL,
                size INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE header_names (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE header_data (
                id INTEGER PRIMARY KEY,
                hash TEXT NOT NULL UNIQUE,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE emails (
                id INTEGER PRIMARY KEY,
                inbox TEXT NOT NULL,
                received_at TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_emails_inbox ON emails(inbox, received_at);

            -- Part payload per tree node. Content ids are plain columns, not
            -- foreign keys: a dangling id is reported when the email is read.
            CREATE TABLE part_lists (
                node_id INTEGER PRIMARY KEY REFERENCES tree_nodes(id) ON DELETE CASCADE,
                body_id INTEGER NOT NULL
            );

            CREATE INDEX idx_part_lists_body ON part_lists(body_id);

            CREATE TABLE header_entries (
                part_id INTEGER NOT NULL REFERENCES part_lists(node_id) ON DELETE CASCADE,
                name_id INTEGER NOT NULL,
                data_id INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                PRIMARY KEY (part_id, ordinal)
            );

            CREATE INDEX idx_header_entries_name ON header_entries(name_id);
            CREATE INDEX idx_header_entries_data ON header_entries(data_id);
            "#,
        ),
    ])
}

/// Apply connection pragmas and bring the schema up to date
pub(crate) fn prepare(conn: &mut Connection) -> Result<()> {
    // WAL lets readers see a consistent snapshot while an ingest writes.
    // foreign_keys must be on for the ON DELETE CASCADE chain
    // (tree_nodes -> part_lists -> header_entries) to fire.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        PRAGMA foreign_keys = ON;
        "#,
    )?;

    let migrations = migrations();
    migrations.to_latest(conn)?;
    info!("Database schema at {}", migrations.current_version(conn)?);
    Ok(())
}

pub(crate) fn set_busy_timeout(conn: &Connection, timeout: Duration) -> Result<()> {
    conn.busy_timeout(timeout)?;
    Ok(())
}
