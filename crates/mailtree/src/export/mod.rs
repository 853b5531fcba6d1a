//! Rebuilding stored emails into messages, one at a time or in batches

mod maildir;
mod mbox;

pub use maildir::MaildirWriter;
pub use mbox::MboxWriter;

use std::collections::HashMap;

use log::debug;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::content::decompress;
use crate::error::{MissingRef, Result, StoreError};
use crate::mime::{Header, MessagePart};
use crate::models::{BodyId, Email, EmailId, HeaderDataId, HeaderNameId, NodeId, NodeKind};
use crate::storage::StoreTx;
use crate::tree::{CachedNode, ForestQuery};

/// A rebuilt email together with its metadata
#[derive(Debug, Clone)]
pub struct ExportedMessage {
    pub email: Email,
    pub message: MessagePart,
}

#[derive(Debug)]
pub struct ExportFailure {
    pub email: EmailId,
    pub error: StoreError,
}

/// Outcome of exporting several emails; failures never abort the batch
#[derive(Debug, Default)]
pub struct ExportBatch {
    pub messages: Vec<ExportedMessage>,
    pub failures: Vec<ExportFailure>,
}

impl ExportBatch {
    pub fn report(&self) -> ExportReport {
        ExportReport {
            exported: self.messages.iter().map(|m| m.email.id).collect(),
            failed: self
                .failures
                .iter()
                .map(|f| FailedExport {
                    email: f.email,
                    error: f.error.to_string(),
                })
                .collect(),
        }
    }
}

/// JSON summary of an export run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub exported: Vec<EmailId>,
    pub failed: Vec<FailedExport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedExport {
    pub email: EmailId,
    pub error: String,
}

pub fn export_email(tx: &StoreTx<'_>, id: EmailId) -> Result<ExportedMessage> {
    let email = tx
        .email(id)?
        .ok_or_else(|| StoreError::NotFound(format!("email {}", id)))?;
    let message = rebuild(tx, id)?;
    Ok(ExportedMessage { email, message })
}

/// Rebuild the message stored for `id`
pub fn reconstruct(tx: &StoreTx<'_>, id: EmailId) -> Result<MessagePart> {
    if tx.email(id)?.is_none() {
        return Err(StoreError::NotFound(format!("email {}", id)));
    }
    rebuild(tx, id)
}

struct StoredPart {
    body: BodyId,
    payload: Option<Vec<u8>>,
}

/// Three queries regardless of part count: the tree, the bodies, the headers
fn rebuild(tx: &StoreTx<'_>, id: EmailId) -> Result<MessagePart> {
    let missing = |missing: MissingRef| StoreError::MissingContent { email: id, missing };

    let kind = NodeKind::part();
    let base = tx.registry().base_of(&kind)?;
    let forest = tx
        .tree()
        .fetch_whole_forest(&ForestQuery::kind(kind.clone()).tree(id.tree_id()))?;
    let root = forest.single_root().ok_or_else(|| missing(MissingRef::PartTree))?;

    let mut parts = load_parts(tx, base, id)?;
    let mut headers = load_headers(tx, base, id)?;

    // Post-order: a node is assembled once all its children are
    let mut built: HashMap<NodeId, MessagePart> = HashMap::with_capacity(forest.len());
    let mut stack: Vec<(CachedNode<'_>, bool)> = vec![(root, false)];

    while let Some((node, children_done)) = stack.pop() {
        if !children_done {
            stack.push((node, true));
            let children: Vec<_> = node.children().collect();
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
            continue;
        }

        let stored = parts
            .remove(&node.id)
            .ok_or_else(|| missing(MissingRef::Part(node.id)))?;
        let payload = stored
            .payload
            .ok_or_else(|| missing(MissingRef::Body(stored.body)))?;

        let mut children = Vec::new();
        for child in node.children() {
            // Every child was finished before its parent came off the stack
            if let Some(part) = built.remove(&child.id) {
                children.push(part);
            }
        }

        let part = MessagePart {
            headers: headers.remove(&node.id).unwrap_or_default(),
            payload: decompress(&payload)?,
            children,
        };
        built.insert(node.id, part);
    }

    let message = built
        .remove(&root.id)
        .ok_or_else(|| missing(MissingRef::PartTree))?;
    debug!("Rebuilt email {} ({} parts)", id, forest.len());
    Ok(message)
}

fn load_parts(
    tx: &StoreTx<'_>,
    base: &NodeKind,
    id: EmailId,
) -> Result<HashMap<NodeId, StoredPart>> {
    tx.counter().bump();
    let mut stmt = tx.conn().prepare(
        "SELECT n.id, p.body_id, b.payload
         FROM tree_nodes n
         JOIN part_lists p ON p.node_id = n.id
         LEFT JOIN bodies b ON b.id = p.body_id
         WHERE n.tree_base = ? AND n.tree_id = ?",
    )?;
    let rows = stmt.query_map(params![base.as_str(), id.get()], |row| {
        Ok((
            NodeId(row.get(0)?),
            StoredPart {
                body: BodyId(row.get(1)?),
                payload: row.get(2)?,
            },
        ))
    })?;

    let mut parts = HashMap::new();
    for row in rows {
        let (node, part) = row?;
        parts.insert(node, part);
    }
    Ok(parts)
}

/// Headers per part, in stored order
fn load_headers(
    tx: &StoreTx<'_>,
    base: &NodeKind,
    id: EmailId,
) -> Result<HashMap<NodeId, Vec<Header>>> {
    tx.counter().bump();
    let mut stmt = tx.conn().prepare(
        "SELECT e.part_id, e.name_id, e.data_id, h.name, d.text
         FROM header_entries e
         JOIN tree_nodes n ON n.id = e.part_id
         LEFT JOIN header_names h ON h.id = e.name_id
         LEFT JOIN header_data d ON d.id = e.data_id
         WHERE n.tree_base = ? AND n.tree_id = ?
         ORDER BY e.part_id, e.ordinal",
    )?;
    let rows = stmt.query_map(params![base.as_str(), id.get()], |row| {
        Ok((
            NodeId(row.get(0)?),
            HeaderNameId(row.get(1)?),
            HeaderDataId(row.get(2)?),
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut headers: HashMap<NodeId, Vec<Header>> = HashMap::new();
    for row in rows {
        let (part, name_id, data_id, name, value) = row?;
        let name = name.ok_or(StoreError::MissingContent {
            email: id,
            missing: MissingRef::HeaderName(name_id),
        })?;
        let value = value.ok_or(StoreError::MissingContent {
            email: id,
            missing: MissingRef::HeaderData(data_id),
        })?;
        headers.entry(part).or_default().push(Header { name, value });
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::storage::SqliteMailTree;
    use crate::tree::KindRegistry;
    use chrono::Utc;

    const MULTIPART: &[u8] = b"From: alice@example.com\r\n\
Subject: parts\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\
\r\n\
plain body\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html body</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAECAw==\r\n\
--outer--\r\n";

    fn store() -> SqliteMailTree {
        SqliteMailTree::open_in_memory(StoreConfig::default(), KindRegistry::default()).unwrap()
    }

    /// Header pairs and leaf payloads in preorder
    fn flatten(part: &MessagePart) -> Vec<(Vec<(String, String)>, Vec<u8>, usize)> {
        let mut out = Vec::new();
        let mut stack = vec![part];
        while let Some(part) = stack.pop() {
            out.push((
                part.headers
                    .iter()
                    .map(|h| (h.name.clone(), h.value.clone()))
                    .collect(),
                part.payload.clone(),
                part.children.len(),
            ));
            stack.extend(part.children.iter().rev());
        }
        out
    }

    #[test]
    fn test_round_trip_matches_parsed_message() {
        let store = store();
        let id = store.ingest(MULTIPART, "bob", Utc::now()).unwrap();

        let rebuilt = store.reconstruct(id).unwrap();
        let parsed = mailparse::parse_mail(MULTIPART).unwrap();
        let expected = owned(&parsed);

        assert_eq!(flatten(&rebuilt), flatten(&expected));
        assert_eq!(rebuilt.part_count(), 5);
    }

    fn owned(part: &mailparse::ParsedMail<'_>) -> MessagePart {
        use crate::mime::MimePart;
        MessagePart {
            headers: part
                .header_pairs()
                .into_iter()
                .map(|(name, value)| Header { name, value })
                .collect(),
            payload: part.payload(),
            children: MimePart::subparts(part).iter().map(owned).collect(),
        }
    }

    #[test]
    fn test_query_count_is_constant() {
        let store = store();
        let small = store
            .ingest(b"Subject: one\r\n\r\nbody", "bob", Utc::now())
            .unwrap();
        let large = store.ingest(MULTIPART, "bob", Utc::now()).unwrap();

        let before = store.query_count();
        store.reconstruct(small).unwrap();
        let small_cost = store.query_count() - before;

        let before = store.query_count();
        store.reconstruct(large).unwrap();
        assert_eq!(store.query_count() - before, small_cost);
        assert_eq!(small_cost, 4);
    }

    #[test]
    fn test_unknown_email() {
        let store = store();
        assert!(matches!(
            store.reconstruct(EmailId(42)),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_body_fails_one_email_of_batch() {
        let store = store();
        let a = store
            .ingest(b"Subject: a\r\n\r\nfirst", "bob", Utc::now())
            .unwrap();
        let b = store
            .ingest(b"Subject: b\r\n\r\nsecond", "bob", Utc::now())
            .unwrap();
        let c = store
            .ingest(b"Subject: c\r\n\r\nthird", "bob", Utc::now())
            .unwrap();

        let body = store.intern_body(b"second").unwrap();
        store
            .write(|tx| {
                tx.conn()
                    .execute("DELETE FROM bodies WHERE id = ?", [body.id.get()])?;
                Ok(())
            })
            .unwrap();

        let batch = store.export_batch(&[a, b, c]);
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0].email.id, a);
        assert_eq!(batch.messages[1].email.id, c);

        assert_eq!(batch.failures.len(), 1);
        let failure = &batch.failures[0];
        assert_eq!(failure.email, b);
        assert!(matches!(
            failure.error,
            StoreError::MissingContent {
                missing: MissingRef::Body(missing),
                ..
            } if missing == body.id
        ));

        let report = batch.report();
        assert_eq!(report.exported, vec![a, c]);
        assert_eq!(report.failed[0].email, b);
    }

    #[test]
    fn test_missing_header_value() {
        let store = store();
        let id = store
            .ingest(b"X-Rare: unique value\r\n\r\nbody", "bob", Utc::now())
            .unwrap();
        store
            .write(|tx| {
                tx.conn()
                    .execute("DELETE FROM header_data WHERE text = 'unique value'", [])?;
                Ok(())
            })
            .unwrap();

        assert!(matches!(
            store.reconstruct(id),
            Err(StoreError::MissingContent {
                missing: MissingRef::HeaderData(_),
                ..
            })
        ));
    }

    #[test]
    fn test_missing_part_tree() {
        let store = store();
        let id = store
            .ingest(b"Subject: gone\r\n\r\nbody", "bob", Utc::now())
            .unwrap();
        store
            .write(|tx| tx.tree().delete_tree(id.tree_id(), &NodeKind::part()))
            .unwrap();

        assert!(matches!(
            store.reconstruct(id),
            Err(StoreError::MissingContent {
                missing: MissingRef::PartTree,
                ..
            })
        ));
    }

    #[test]
    fn test_report_json() {
        let report = ExportReport {
            exported: vec![EmailId(1)],
            failed: vec![FailedExport {
                email: EmailId(2),
                error: "Email 2 is missing body 7".to_string(),
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"{"exported":[1],"failed":[{"email":2,"error":"Email 2 is missing body 7"}]}"#
        );
    }
}
