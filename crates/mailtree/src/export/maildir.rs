//! Maildir output for exported mail

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::debug;

use super::ExportedMessage;
use crate::mime::MessagePart;
use crate::models::EmailFlags;

const SUBDIRS: [&str; 3] = ["tmp", "new", "cur"];

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Writes messages into a Maildir++ tree, one folder per inbox.
///
/// A message is written under the folder's `tmp/` and then renamed into
/// `new/`, or into `cur/` with an info suffix when it carries flags, so a
/// reader never sees a partial file.
pub struct MaildirWriter {
    root: PathBuf,
    written: usize,
}

impl MaildirWriter {
    /// Create the top-level Maildir at `root` if it does not exist
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        make_maildir(&root)?;
        Ok(Self { root, written: 0 })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding the messages of `inbox`, created on first use
    pub fn folder(&self, inbox: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(folder_name(inbox)?);
        make_maildir(&dir)?;
        Ok(dir)
    }

    pub fn write_exported(&mut self, exported: &ExportedMessage) -> io::Result<PathBuf> {
        self.write_message(
            &exported.email.inbox,
            exported.email.flags,
            &exported.message,
        )
    }

    /// Deliver one message into the folder for `inbox`, returning its path
    pub fn write_message(
        &mut self,
        inbox: &str,
        flags: EmailFlags,
        message: &MessagePart,
    ) -> io::Result<PathBuf> {
        let folder = self.folder(inbox)?;
        let name = unique_name();

        let tmp = folder.join("tmp").join(&name);
        let file = File::create_new(&tmp)?;
        message.write_to(BufWriter::new(&file))?;
        file.sync_all()?;

        let dest = match info(flags) {
            Some(info) => folder.join("cur").join(format!("{}:2,{}", name, info)),
            None => folder.join("new").join(&name),
        };
        fs::rename(&tmp, &dest)?;
        debug!("Delivered message to {}", dest.display());

        self.written += 1;
        Ok(dest)
    }

    /// Messages written so far
    pub fn written(&self) -> usize {
        self.written
    }
}

fn make_maildir(dir: &Path) -> io::Result<()> {
    for sub in SUBDIRS {
        fs::create_dir_all(dir.join(sub))?;
    }
    Ok(())
}

/// Maildir++ folder directory name for an inbox
fn folder_name(inbox: &str) -> io::Result<String> {
    let name = inbox.trim();
    if name.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty inbox name",
        ));
    }
    let name: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    Ok(format!(".{}", name))
}

/// `secs.M<micros>P<pid>Q<seq>.mailtree`, unique within this host
fn unique_name() -> String {
    let now = Utc::now();
    format!(
        "{}.M{}P{}Q{}.mailtree",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

/// Info flags in ASCII order, or `None` for a message that belongs in `new/`
fn info(flags: EmailFlags) -> Option<String> {
    let mut info = String::new();
    if flags.contains(EmailFlags::IMPORTANT) {
        info.push('F');
    }
    if flags.intersects(EmailFlags::READ | EmailFlags::SEEN) {
        info.push('S');
    }
    (!info.is_empty()).then_some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::Header;
    use tempfile::TempDir;

    fn message(subject: &str) -> MessagePart {
        MessagePart::leaf(vec![Header::new("Subject", subject)], "body\r\n")
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_unread_message_lands_in_new() {
        let dir = TempDir::new().unwrap();
        let mut writer = MaildirWriter::create(dir.path().join("mail")).unwrap();

        let path = writer
            .write_message("bob@example.com", EmailFlags::empty(), &message("hi"))
            .unwrap();
        assert_eq!(writer.written(), 1);

        let folder = writer.root().join(".bob@example.com");
        assert_eq!(entries(&folder.join("new")), vec![path.clone()]);
        assert!(entries(&folder.join("tmp")).is_empty());
        assert!(entries(&folder.join("cur")).is_empty());
        assert_eq!(fs::read(&path).unwrap(), b"Subject: hi\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_flagged_message_lands_in_cur() {
        let dir = TempDir::new().unwrap();
        let mut writer = MaildirWriter::create(dir.path()).unwrap();

        let path = writer
            .write_message(
                "bob",
                EmailFlags::SEEN | EmailFlags::IMPORTANT,
                &message("read"),
            )
            .unwrap();

        assert_eq!(path.parent().unwrap(), dir.path().join(".bob").join("cur"));
        assert!(path.to_string_lossy().ends_with(":2,FS"));
    }

    #[test]
    fn test_one_folder_per_inbox() {
        let dir = TempDir::new().unwrap();
        let mut writer = MaildirWriter::create(dir.path()).unwrap();

        writer
            .write_message("alice", EmailFlags::empty(), &message("a1"))
            .unwrap();
        writer
            .write_message("alice", EmailFlags::empty(), &message("a2"))
            .unwrap();
        writer
            .write_message("../escape", EmailFlags::empty(), &message("b"))
            .unwrap();

        for sub in SUBDIRS {
            assert!(dir.path().join(sub).is_dir());
        }
        assert_eq!(entries(&dir.path().join(".alice").join("new")).len(), 2);
        assert_eq!(entries(&dir.path().join("..._escape").join("new")).len(), 1);
        assert!(writer.folder("  ").is_err());
    }

    #[test]
    fn test_names_are_unique() {
        let names: std::collections::HashSet<_> = (0..100).map(|_| unique_name()).collect();
        assert_eq!(names.len(), 100);
    }
}
