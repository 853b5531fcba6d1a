//! Content-addressed rows: bodies, header names and header values

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::NodeId;

row_id!(BodyId);
row_id!(HeaderNameId);
row_id!(HeaderDataId);

/// Hash identifying stored content, formatted as `<algo>:<hexdigest>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    const ALGORITHM: &'static str = "sha256";

    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(format!("{}:{}", Self::ALGORITHM, hex::encode(digest)))
    }

    /// Wrap a hash string read back from storage
    pub fn from_stored(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deduplicated payload. The bytes themselves are loaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub id: BodyId,
    pub hash: ContentHash,
    /// Uncompressed payload length in bytes
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderName {
    pub id: HeaderNameId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderData {
    pub id: HeaderDataId,
    pub hash: ContentHash,
}

/// Join row placing one header at a position within a part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub part: NodeId,
    pub name: HeaderNameId,
    pub data: HeaderDataId,
    pub ordinal: u32,
}
