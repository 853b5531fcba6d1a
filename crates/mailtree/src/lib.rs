//! Mailtree - hierarchical, content-addressed storage for received mail
//!
//! This crate provides:
//! - Nested-set trees over one flat table, for MIME part trees and other
//!   shallow hierarchies (page trees)
//! - Deduplicated storage of bodies and header values
//! - Ingestion of MIME messages into part trees
//! - Reconstruction of stored messages for export, in Maildir or mbox form
//!
//! Everything persists through [`SqliteMailTree`].

pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod ingest;
pub mod mime;
pub mod models;
pub mod storage;
pub mod tree;

pub use config::{InsertMode, StoreConfig};
pub use content::{ContentStore, SweepStats};
pub use error::{MissingRef, Result, StoreError};
pub use export::{
    ExportBatch, ExportFailure, ExportReport, ExportedMessage, FailedExport, MaildirWriter,
    MboxWriter,
};
pub use mime::{Header, MessagePart, MimePart};
pub use models::{
    Body, BodyId, ContentHash, Email, EmailFlags, EmailId, HeaderData, HeaderDataId, HeaderEntry,
    HeaderName, HeaderNameId, NodeId, NodeKind, TreeId, TreeNode,
};
pub use storage::{QueryCounter, SqliteMailTree, StoreCounts, StoreTx};
pub use tree::{CachedNode, Forest, ForestQuery, KindRegistry, KindRegistryBuilder, TreeStore};
