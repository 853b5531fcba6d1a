//! Turning a parsed MIME message into an email's part tree

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::params;

use crate::content::ContentStore;
use crate::error::{Result, StoreError};
use crate::mime::MimePart;
use crate::models::{EmailId, HeaderEntry, NodeKind, TreeNode};
use crate::storage::StoreTx;

/// Parse raw RFC 822 bytes
pub fn parse_message(raw: &[u8]) -> Result<mailparse::ParsedMail<'_>> {
    Ok(mailparse::parse_mail(raw)?)
}

struct Frame<'p, P> {
    node: TreeNode,
    part: &'p P,
    next_child: usize,
}

/// Store `message` as a new email in `inbox`.
///
/// Must run inside a write transaction; a failure part-way leaves nothing
/// behind once the caller rolls back. Parts are written in preorder, each
/// subtree complete before its next sibling is appended.
pub fn ingest_message<P: MimePart>(
    tx: &StoreTx<'_>,
    message: &P,
    inbox: &str,
    received_at: DateTime<Utc>,
) -> Result<EmailId> {
    check_depth(message, tx.config().max_part_depth)?;

    tx.counter().bump();
    tx.conn().execute(
        "INSERT INTO emails (inbox, received_at, flags) VALUES (?, ?, 0)",
        params![inbox, received_at.to_rfc3339()],
    )?;
    let email = EmailId(tx.conn().last_insert_rowid());

    let tree = tx.tree();
    let content = tx.content();
    let kind = NodeKind::part();

    let root = tree.insert_root(email.tree_id(), &kind)?;
    store_part(tx, &content, &root, message)?;

    let mut parts = 1usize;
    let mut stack = vec![Frame {
        node: root,
        part: message,
        next_child: 0,
    }];

    while let Some(frame) = stack.last_mut() {
        let Some(child) = frame.part.subparts().get(frame.next_child) else {
            stack.pop();
            continue;
        };
        frame.next_child += 1;

        let node = tree.insert_child(&frame.node, &kind)?;
        store_part(tx, &content, &node, child)?;
        parts += 1;
        stack.push(Frame {
            node,
            part: child,
            next_child: 0,
        });
    }

    debug!("Ingested email {} into {} ({} parts)", email, inbox, parts);
    Ok(email)
}

/// Body reference plus ordered header entries for one part
fn store_part<P: MimePart>(
    tx: &StoreTx<'_>,
    content: &ContentStore<'_>,
    node: &TreeNode,
    part: &P,
) -> Result<()> {
    let body = content.intern_body(&part.payload())?;

    tx.counter().bump();
    tx.conn().execute(
        "INSERT INTO part_lists (node_id, body_id) VALUES (?, ?)",
        params![node.id.get(), body.id.get()],
    )?;

    for (ordinal, (name, value)) in part.header_pairs().iter().enumerate() {
        let entry = HeaderEntry {
            part: node.id,
            name: content.intern_header_name(name)?.id,
            data: content.intern_header_value(value)?.id,
            ordinal: ordinal as u32,
        };
        insert_header_entry(tx, &entry)?;
    }
    Ok(())
}

fn insert_header_entry(tx: &StoreTx<'_>, entry: &HeaderEntry) -> Result<()> {
    tx.counter().bump();
    tx.conn().execute(
        "INSERT INTO header_entries (part_id, name_id, data_id, ordinal)
         VALUES (?, ?, ?, ?)",
        params![
            entry.part.get(),
            entry.name.get(),
            entry.data.get(),
            entry.ordinal
        ],
    )?;
    Ok(())
}

/// Reject messages nested deeper than `max_depth` (the root part is depth 0)
fn check_depth<P: MimePart>(message: &P, max_depth: usize) -> Result<()> {
    let mut stack = vec![(message, 0usize)];
    while let Some((part, depth)) = stack.pop() {
        if depth > max_depth {
            return Err(StoreError::Parse(format!(
                "MIME parts nested deeper than {} levels",
                max_depth
            )));
        }
        stack.extend(part.subparts().iter().map(|child| (child, depth + 1)));
    }
    Ok(())
}
