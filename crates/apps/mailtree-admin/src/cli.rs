use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "mailtree-admin", version, about = "Maintenance for the mail tree store")]
pub(crate) struct Cli {
    /// Database file (overrides the config file and MAILTREE_DB)
    #[arg(long, global = true)]
    pub(crate) db: Option<PathBuf>,
    /// Config file to use instead of mailtree.json in the config directory
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Store a raw RFC 822 message
    Ingest(IngestCmd),
    /// Write inboxes to a Maildir or an mbox file
    Export(ExportCmd),
    /// Print one stored tree
    Tree(TreeCmd),
    /// Delete content no email references any more
    Sweep,
    /// Delete an email and its part tree
    Delete(DeleteCmd),
    /// Print row counts
    Stats,
}

#[derive(Args, Debug)]
pub(crate) struct IngestCmd {
    pub(crate) file: PathBuf,
    #[arg(long)]
    pub(crate) inbox: String,
    /// Receive time as RFC 3339; defaults to now
    #[arg(long = "received-at")]
    pub(crate) received_at: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ExportCmd {
    /// Inbox to export; repeat for several
    #[arg(long = "inbox", required = true)]
    pub(crate) inboxes: Vec<String>,
    /// Maildir directory or mbox file to create
    #[arg(long)]
    pub(crate) out: PathBuf,
    #[arg(long, value_enum, default_value_t = ExportFormat::Maildir)]
    pub(crate) format: ExportFormat,
    /// Also write a JSON report of exported and failed emails
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportFormat {
    /// One Maildir++ folder per inbox
    Maildir,
    /// All inboxes in a single mboxrd file
    Mbox,
}

#[derive(Args, Debug)]
pub(crate) struct TreeCmd {
    pub(crate) tree_id: i64,
    #[arg(long, default_value = "part")]
    pub(crate) kind: String,
}

#[derive(Args, Debug)]
pub(crate) struct DeleteCmd {
    pub(crate) email_id: i64,
}
