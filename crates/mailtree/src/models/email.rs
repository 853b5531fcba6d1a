//! Email aggregate root

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TreeId;

row_id!(
    /// Primary key of an `emails` row
    EmailId
);

impl EmailId {
    /// Each email owns exactly one part tree, keyed by the email id
    pub fn tree_id(self) -> TreeId {
        TreeId(self.0)
    }

    /// Short hex form used in export log lines
    pub fn to_hex(self) -> String {
        format!("{:x}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EmailFlags: u16 {
        const DELETED = 1 << 0;
        const READ = 1 << 1;
        const SEEN = 1 << 2;
        const IMPORTANT = 1 << 3;
        const VIEW_ALL_HEADERS = 1 << 4;
    }
}

/// A received email; its MIME structure lives in the part tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    /// Inbox address the message was delivered to
    pub inbox: String,
    pub received_at: DateTime<Utc>,
    pub flags: EmailFlags,
}
