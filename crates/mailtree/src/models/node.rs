//! Nested-set tree node model

use std::fmt;

use serde::{Deserialize, Serialize};

row_id!(
    /// Primary key of a `tree_nodes` row
    NodeId
);

row_id!(
    /// Discriminates independent trees stored in the same table.
    ///
    /// Email part trees use the email's id as their tree id.
    TreeId
);

/// Concrete entity kind of a node (e.g. `part`, `page`, `redirect_page`)
///
/// Several kinds can share one tree when they resolve to the same tree
/// base in the [`KindRegistry`](crate::tree::KindRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKind(String);

impl NodeKind {
    /// MIME part of an email
    pub const PART: &'static str = "part";
    /// CMS page
    pub const PAGE: &'static str = "page";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn part() -> Self {
        Self::new(Self::PART)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One node of a nested-set tree
///
/// `lft`/`rght` bracket the node's whole subtree, so ancestry reduces to
/// range containment. Values reflect the row at the time it was read;
/// inserting below an ancestor changes that ancestor's stored `rght`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub tree_id: TreeId,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub lft: u32,
    pub rght: u32,
    /// Depth from the root (root is 0)
    pub level: u32,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf_node(&self) -> bool {
        self.rght == self.lft + 1
    }

    /// Whether `other` lies strictly inside this node's subtree
    pub fn contains(&self, other: &TreeNode) -> bool {
        self.tree_id == other.tree_id && self.lft < other.lft && other.rght < self.rght
    }

    /// Number of nodes below this one, derived from the range width
    pub fn descendant_count(&self) -> u32 {
        (self.rght - self.lft - 1) / 2
    }
}
