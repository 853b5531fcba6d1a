//! In-memory forest materialized from a single ordered scan

use std::collections::HashMap;
use std::ops::Deref;

use crate::models::{NodeId, TreeNode};

/// A set of trees with parent/child links resolved in memory.
///
/// Traversal through [`CachedNode`] never touches storage.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    nodes: Vec<TreeNode>,
    parents: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
    index: HashMap<NodeId, usize>,
}

impl Forest {
    /// Build from rows where every parent precedes its children (`lft`
    /// order within each tree). Rows whose parent is absent become roots.
    pub fn from_ordered(rows: impl IntoIterator<Item = TreeNode>) -> Self {
        let mut forest = Forest::default();
        for node in rows {
            let idx = forest.nodes.len();
            let parent = node.parent.and_then(|id| forest.index.get(&id).copied());
            match parent {
                Some(parent_idx) => forest.children[parent_idx].push(idx),
                None => forest.roots.push(idx),
            }
            forest.index.insert(node.id, idx);
            forest.nodes.push(node);
            forest.parents.push(parent);
            forest.children.push(Vec::new());
        }
        forest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl ExactSizeIterator<Item = CachedNode<'_>> + '_ {
        self.roots.iter().map(move |&index| CachedNode { forest: self, index })
    }

    /// The only root, if there is exactly one
    pub fn single_root(&self) -> Option<CachedNode<'_>> {
        match self.roots.as_slice() {
            [index] => Some(CachedNode {
                forest: self,
                index: *index,
            }),
            _ => None,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<CachedNode<'_>> {
        self.index
            .get(&id)
            .map(|&index| CachedNode { forest: self, index })
    }

    /// All nodes in scan order
    pub fn iter(&self) -> impl Iterator<Item = CachedNode<'_>> + '_ {
        (0..self.nodes.len()).map(move |index| CachedNode { forest: self, index })
    }

    pub fn into_nodes(self) -> Vec<TreeNode> {
        self.nodes
    }
}

/// A node borrowed from a [`Forest`], with cached relatives
#[derive(Debug, Clone, Copy)]
pub struct CachedNode<'f> {
    forest: &'f Forest,
    index: usize,
}

impl<'f> CachedNode<'f> {
    pub fn node(&self) -> &'f TreeNode {
        &self.forest.nodes[self.index]
    }

    /// Parent within the fetched forest; `None` for roots and for nodes
    /// whose parent was outside the fetch
    pub fn parent(&self) -> Option<CachedNode<'f>> {
        self.forest.parents[self.index].map(|index| CachedNode {
            forest: self.forest,
            index,
        })
    }

    /// Children in `lft` order
    pub fn children(&self) -> impl ExactSizeIterator<Item = CachedNode<'f>> + 'f {
        let forest = self.forest;
        forest.children[self.index]
            .iter()
            .map(move |&index| CachedNode { forest, index })
    }

    /// Other children of the same parent, in `lft` order.
    ///
    /// Empty for forest roots.
    pub fn siblings(&self) -> Vec<CachedNode<'f>> {
        let Some(parent) = self.forest.parents[self.index] else {
            return Vec::new();
        };
        let forest = self.forest;
        forest.children[parent]
            .iter()
            .filter(|&&index| index != self.index)
            .map(|&index| CachedNode { forest, index })
            .collect()
    }
}

impl Deref for CachedNode<'_> {
    type Target = TreeNode;

    fn deref(&self) -> &TreeNode {
        self.node()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeKind, TreeId};

    fn node(id: i64, tree: i64, parent: Option<i64>, lft: u32, rght: u32, level: u32) -> TreeNode {
        TreeNode {
            id: NodeId(id),
            tree_id: TreeId(tree),
            kind: NodeKind::part(),
            parent: parent.map(NodeId),
            lft,
            rght,
            level,
        }
    }

    fn sample() -> Vec<TreeNode> {
        // 1 ─┬─ 2 ── 3
        //    └─ 4
        vec![
            node(1, 1, None, 1, 8, 0),
            node(2, 1, Some(1), 2, 5, 1),
            node(3, 1, Some(2), 3, 4, 2),
            node(4, 1, Some(1), 6, 7, 1),
        ]
    }

    #[test]
    fn test_single_root() {
        let forest = Forest::from_ordered(sample());
        assert_eq!(forest.len(), 4);

        let root = forest.single_root().unwrap();
        assert_eq!(root.id, NodeId(1));
        let children: Vec<NodeId> = root.children().map(|c| c.id).collect();
        assert_eq!(children, vec![NodeId(2), NodeId(4)]);

        let grandchild = forest.get(NodeId(3)).unwrap();
        assert_eq!(grandchild.parent().unwrap().id, NodeId(2));
        assert_eq!(grandchild.children().len(), 0);
    }

    #[test]
    fn test_multiple_roots() {
        let mut rows = sample();
        rows.push(node(5, 2, None, 1, 4, 0));
        rows.push(node(6, 2, Some(5), 2, 3, 1));

        let forest = Forest::from_ordered(rows);
        assert_eq!(forest.roots().len(), 2);
        assert!(forest.single_root().is_none());
        assert_eq!(forest.get(NodeId(6)).unwrap().parent().unwrap().id, NodeId(5));
    }

    #[test]
    fn test_subtree_parent_outside_fetch() {
        let rows: Vec<TreeNode> = sample().into_iter().skip(1).take(2).collect();
        let forest = Forest::from_ordered(rows);

        let root = forest.single_root().unwrap();
        assert_eq!(root.id, NodeId(2));
        assert!(root.parent().is_none());
        assert!(!root.is_root());
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_cached_siblings() {
        let forest = Forest::from_ordered(sample());
        let first = forest.get(NodeId(2)).unwrap();

        let siblings: Vec<NodeId> = first.siblings().iter().map(|s| s.id).collect();
        assert_eq!(siblings, vec![NodeId(4)]);
        assert!(forest.single_root().unwrap().siblings().is_empty());
    }

    #[test]
    fn test_empty() {
        let forest = Forest::from_ordered(Vec::new());
        assert!(forest.is_empty());
        assert!(forest.single_root().is_none());
    }
}
