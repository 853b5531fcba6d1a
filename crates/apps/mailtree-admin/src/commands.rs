//! Subcommand implementations

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{info, warn};
use mailtree::{
    EmailId, ExportBatch, Forest, MaildirWriter, MboxWriter, NodeKind, SqliteMailTree, TreeId,
};

use crate::cli::{DeleteCmd, ExportCmd, ExportFormat, IngestCmd, TreeCmd};

pub(crate) fn ingest(store: &SqliteMailTree, cmd: &IngestCmd) -> Result<()> {
    let raw = std::fs::read(&cmd.file)
        .with_context(|| format!("Failed to read message file: {}", cmd.file.display()))?;
    let received_at = match &cmd.received_at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid --received-at value: {}", text))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let id = store.ingest(&raw, &cmd.inbox, received_at)?;
    info!("Stored {} as email {}", cmd.file.display(), id);
    println!("{}", id);
    Ok(())
}

pub(crate) fn export(store: &SqliteMailTree, cmd: &ExportCmd) -> Result<()> {
    let mut ids = Vec::new();
    for inbox in &cmd.inboxes {
        ids.extend(store.list_email_ids(inbox)?);
    }
    let batch = store.export_batch(&ids);

    let written = match cmd.format {
        ExportFormat::Maildir => write_maildir(&cmd.out, &cmd.inboxes, &batch)?,
        ExportFormat::Mbox => write_mbox(&cmd.out, &batch)?,
    };

    if let Some(path) = &cmd.report {
        let json = serde_json::to_string_pretty(&batch.report())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    info!(
        "Exported {} emails from {} inboxes to {}",
        written,
        cmd.inboxes.len(),
        cmd.out.display()
    );
    if !batch.failures.is_empty() {
        warn!("{} emails could not be exported", batch.failures.len());
    }
    Ok(())
}

/// Every requested inbox gets a folder, even one with nothing to export
fn write_maildir(out: &Path, inboxes: &[String], batch: &ExportBatch) -> Result<usize> {
    let mut maildir = MaildirWriter::create(out)
        .with_context(|| format!("Failed to create maildir: {}", out.display()))?;
    for inbox in inboxes {
        maildir
            .folder(inbox)
            .with_context(|| format!("Failed to create folder for {}", inbox))?;
    }
    for exported in &batch.messages {
        maildir
            .write_exported(exported)
            .with_context(|| format!("Failed to write email {}", exported.email.id))?;
    }
    Ok(maildir.written())
}

fn write_mbox(out: &Path, batch: &ExportBatch) -> Result<usize> {
    let file = File::create(out)
        .with_context(|| format!("Failed to create mbox file: {}", out.display()))?;
    let mut mbox = MboxWriter::new(BufWriter::new(file));
    for exported in &batch.messages {
        mbox.write_exported(exported)
            .with_context(|| format!("Failed to write email {}", exported.email.id))?;
    }
    let written = mbox.written();
    mbox.finish().context("Failed to flush mbox file")?;
    Ok(written)
}

pub(crate) fn tree(store: &SqliteMailTree, cmd: &TreeCmd) -> Result<()> {
    let kind = NodeKind::new(cmd.kind.as_str());
    let forest = store.fetch_tree(TreeId(cmd.tree_id), &kind)?;
    if forest.is_empty() {
        bail!("No {} tree with id {}", kind, cmd.tree_id);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_forest(&mut out, &forest)?;
    Ok(())
}

/// One line per node, indented by level, in `lft` order
fn write_forest(out: &mut impl Write, forest: &Forest) -> Result<()> {
    let mut stack: Vec<_> = forest.roots().collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        writeln!(
            out,
            "{}{} {} [{}, {}]",
            "  ".repeat(node.level as usize),
            node.id,
            node.kind,
            node.lft,
            node.rght
        )?;
        let children: Vec<_> = node.children().collect();
        stack.extend(children.into_iter().rev());
    }
    Ok(())
}

pub(crate) fn sweep(store: &SqliteMailTree) -> Result<()> {
    let stats = store.sweep_orphans()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub(crate) fn delete(store: &SqliteMailTree, cmd: &DeleteCmd) -> Result<()> {
    let id = EmailId(cmd.email_id);
    if !store.delete_email(id)? {
        bail!("No email with id {}", id);
    }
    info!("Deleted email {}; run sweep to drop its content", id);
    Ok(())
}

pub(crate) fn stats(store: &SqliteMailTree) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&store.counts()?)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailtree::{KindRegistry, StoreConfig};

    fn export_cmd(out: &Path, format: ExportFormat) -> ExportCmd {
        ExportCmd {
            inboxes: vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
            out: out.to_path_buf(),
            format,
            report: Some(out.with_extension("json")),
        }
    }

    fn store_with_mail() -> SqliteMailTree {
        let store =
            SqliteMailTree::open_in_memory(StoreConfig::default(), KindRegistry::default())
                .unwrap();
        store.ingest(b"Subject: one\r\n\r\nfirst", "alice", Utc::now()).unwrap();
        store.ingest(b"Subject: two\r\n\r\nsecond", "alice", Utc::now()).unwrap();
        store.ingest(b"Subject: three\r\n\r\nthird", "bob", Utc::now()).unwrap();
        store.ingest(b"Subject: other\r\n\r\nnot exported", "dave", Utc::now()).unwrap();
        store
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_export_maildir_folder_per_inbox() {
        let store = store_with_mail();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("liberated");

        export(&store, &export_cmd(&out, ExportFormat::Maildir)).unwrap();

        assert_eq!(count_files(&out.join(".alice").join("new")), 2);
        assert_eq!(count_files(&out.join(".bob").join("new")), 1);
        assert_eq!(count_files(&out.join(".carol").join("new")), 0);
        assert!(!out.join(".dave").exists());

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(report["exported"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_export_mbox_combines_inboxes() {
        let store = store_with_mail();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("liberated.mbox");

        export(&store, &export_cmd(&out, ExportFormat::Mbox)).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.matches("From MAILER-DAEMON").count(), 3);
        assert!(text.contains("third"));
        assert!(!text.contains("not exported"));
    }

    #[test]
    fn test_write_forest_indents_by_level() {
        let store =
            SqliteMailTree::open_in_memory(StoreConfig::default(), KindRegistry::default())
                .unwrap();
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\none\r\n--b\r\n\r\ntwo\r\n--b--\r\n";
        let id = store.ingest(raw, "bob", Utc::now()).unwrap();
        let forest = store.fetch_tree(id.tree_id(), &NodeKind::part()).unwrap();

        let mut out = Vec::new();
        write_forest(&mut out, &forest).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("1 part [1, 6]"));
        assert!(lines[1].starts_with("  "));
        assert!(lines[1].ends_with("part [2, 3]"));
        assert!(lines[2].ends_with("part [4, 5]"));
    }
}
