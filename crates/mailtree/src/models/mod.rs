//! Domain models for stored mail trees

/// Row identifiers are SQLite rowids wrapped in per-table newtypes
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

mod content;
mod email;
mod node;

pub use content::{Body, BodyId, ContentHash, HeaderData, HeaderDataId, HeaderEntry, HeaderName, HeaderNameId};
pub use email::{Email, EmailFlags, EmailId};
pub use node::{NodeId, NodeKind, TreeId, TreeNode};
