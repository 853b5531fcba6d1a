//! Nested-set tree storage over the flat `tree_nodes` table
//!
//! Every row carries `lft`/`rght` bounds, its `level`, its `parent`, the
//! tree base its kind resolves to, and the tree id. Containment is a range
//! comparison and a whole forest comes back from one ordered scan.

mod forest;
mod registry;

pub use forest::{CachedNode, Forest};
pub use registry::{KindRegistry, KindRegistryBuilder};

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::config::InsertMode;
use crate::error::{Result, StoreError};
use crate::models::{NodeId, NodeKind, TreeId, TreeNode};
use crate::storage::QueryCounter;

const NODE_COLUMNS: &str = "id, tree_id, kind, parent_id, lft, rght, level";

/// Filter for [`TreeStore::fetch_whole_forest`]
#[derive(Debug, Clone)]
pub struct ForestQuery {
    kind: NodeKind,
    tree_id: Option<TreeId>,
    within: Option<(u32, u32)>,
}

impl ForestQuery {
    /// Every tree of `kind`'s tree base
    pub fn kind(kind: impl Into<NodeKind>) -> Self {
        Self {
            kind: kind.into(),
            tree_id: None,
            within: None,
        }
    }

    /// Restrict to one tree
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// Restrict to `node` and its descendants
    pub fn subtree_of(mut self, node: &TreeNode) -> Self {
        self.tree_id = Some(node.tree_id);
        self.within = Some((node.lft, node.rght));
        self
    }
}

/// Tree operations bound to one connection (usually an open transaction)
pub struct TreeStore<'a> {
    conn: &'a Connection,
    registry: &'a KindRegistry,
    counter: &'a QueryCounter,
    mode: InsertMode,
}

impl<'a> TreeStore<'a> {
    pub fn new(
        conn: &'a Connection,
        registry: &'a KindRegistry,
        counter: &'a QueryCounter,
        mode: InsertMode,
    ) -> Self {
        Self {
            conn,
            registry,
            counter,
            mode,
        }
    }

    /// Create the root of tree `tree_id`: `{lft: 1, rght: 2, level: 0}`
    pub fn insert_root(&self, tree_id: TreeId, kind: &NodeKind) -> Result<TreeNode> {
        let base = self.registry.base_of(kind)?;

        self.counter.bump();
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM tree_nodes
                 WHERE tree_base = ? AND tree_id = ? AND parent_id IS NULL",
                params![base.as_str(), tree_id.get()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(root) = existing {
            return Err(StoreError::invalid(format!(
                "{} tree {} already has root node {}",
                base, tree_id, root
            )));
        }

        self.counter.bump();
        self.conn.execute(
            "INSERT INTO tree_nodes (tree_base, tree_id, kind, parent_id, lft, rght, level)
             VALUES (?, ?, ?, NULL, 1, 2, 0)",
            params![base.as_str(), tree_id.get(), kind.as_str()],
        )?;

        Ok(TreeNode {
            id: NodeId(self.conn.last_insert_rowid()),
            tree_id,
            kind: kind.clone(),
            parent: None,
            lft: 1,
            rght: 2,
            level: 0,
        })
    }

    /// Append a new last child under `parent`.
    ///
    /// Must run inside a write transaction: the parent row is re-read
    /// there, so two writers can never compute the same `lft`. Stored
    /// bounds of the parent (and, under [`InsertMode::ShiftAncestors`],
    /// of every ancestor and right-hand node) grow by 2; copies the
    /// caller already holds are stale afterwards.
    pub fn insert_child(&self, parent: &TreeNode, kind: &NodeKind) -> Result<TreeNode> {
        if self.conn.is_autocommit() {
            return Err(StoreError::invalid(
                "insert_child must run inside a transaction",
            ));
        }
        let base = self.registry.base_of(kind)?;

        self.counter.bump();
        let current: Option<(String, i64, u32, u32)> = self
            .conn
            .query_row(
                "SELECT tree_base, tree_id, lft, level FROM tree_nodes WHERE id = ?",
                [parent.id.get()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((parent_base, tree_id, parent_lft, parent_level)) = current else {
            return Err(StoreError::NotFound(format!("tree node {}", parent.id)));
        };
        if parent_base != base.as_str() {
            return Err(StoreError::invalid(format!(
                "cannot attach a '{}' node to node {} of a {} tree",
                kind, parent.id, parent_base
            )));
        }

        self.counter.bump();
        let last_child_rght: Option<u32> = self.conn.query_row(
            "SELECT MAX(rght) FROM tree_nodes WHERE parent_id = ?",
            [parent.id.get()],
            |row| row.get(0),
        )?;
        let lft = last_child_rght.map_or(parent_lft + 1, |rght| rght + 1);
        let rght = lft + 1;

        match self.mode {
            InsertMode::ShiftAncestors => {
                // rght before lft keeps the lft < rght check satisfied per row
                self.counter.bump();
                self.conn.execute(
                    "UPDATE tree_nodes SET rght = rght + 2
                     WHERE tree_base = ? AND tree_id = ? AND rght >= ?",
                    params![base.as_str(), tree_id, lft],
                )?;
                self.counter.bump();
                self.conn.execute(
                    "UPDATE tree_nodes SET lft = lft + 2
                     WHERE tree_base = ? AND tree_id = ? AND lft >= ?",
                    params![base.as_str(), tree_id, lft],
                )?;
            }
            InsertMode::ParentOnly => {
                self.counter.bump();
                self.conn.execute(
                    "UPDATE tree_nodes SET rght = rght + 2 WHERE id = ?",
                    [parent.id.get()],
                )?;
            }
        }

        self.counter.bump();
        self.conn.execute(
            "INSERT INTO tree_nodes (tree_base, tree_id, kind, parent_id, lft, rght, level)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                base.as_str(),
                tree_id,
                kind.as_str(),
                parent.id.get(),
                lft,
                rght,
                parent_level + 1
            ],
        )?;

        Ok(TreeNode {
            id: NodeId(self.conn.last_insert_rowid()),
            tree_id: TreeId(tree_id),
            kind: kind.clone(),
            parent: Some(parent.id),
            lft,
            rght,
            level: parent_level + 1,
        })
    }

    pub fn get_node(&self, id: NodeId) -> Result<Option<TreeNode>> {
        self.counter.bump();
        let node = self
            .conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM tree_nodes WHERE id = ?"),
                [id.get()],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Direct children of `node` in `lft` order (one query)
    pub fn children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        self.counter.bump();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM tree_nodes WHERE parent_id = ? ORDER BY lft"
        ))?;
        let children = stmt
            .query_map([node.id.get()], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children)
    }

    /// Nodes sharing `node`'s parent, excluding `node` (one query; none for roots)
    pub fn siblings(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        let Some(parent) = node.parent else {
            return Ok(Vec::new());
        };
        self.counter.bump();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM tree_nodes
             WHERE parent_id = ? AND id != ? ORDER BY lft"
        ))?;
        let siblings = stmt
            .query_map(params![parent.get(), node.id.get()], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(siblings)
    }

    /// Materialize matching trees with exactly one query.
    ///
    /// Rows come back in `lft` order per tree, so a parent is always seen
    /// before its children. Malformed data never fails the fetch; nodes
    /// whose parent is missing simply surface as extra roots.
    pub fn fetch_whole_forest(&self, query: &ForestQuery) -> Result<Forest> {
        let base = self.registry.base_of(&query.kind)?;

        let mut sql = format!("SELECT {NODE_COLUMNS} FROM tree_nodes WHERE tree_base = ?1");
        if query.tree_id.is_some() {
            sql.push_str(" AND tree_id = ?2");
        }
        if query.within.is_some() {
            sql.push_str(" AND lft >= ?3 AND rght <= ?4");
        }
        sql.push_str(" ORDER BY tree_id, lft");

        let tree_id = query.tree_id.map(TreeId::get);
        let (lft, rght) = query.within.unzip();

        self.counter.bump();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match (tree_id, lft, rght) {
            (Some(tree_id), Some(lft), Some(rght)) => stmt
                .query_map(params![base.as_str(), tree_id, lft, rght], node_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            (Some(tree_id), _, _) => stmt
                .query_map(params![base.as_str(), tree_id], node_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            _ => stmt
                .query_map(params![base.as_str()], node_from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Forest::from_ordered(rows))
    }

    /// Delete every node of a tree; dependent rows cascade
    pub fn delete_tree(&self, tree_id: TreeId, kind: &NodeKind) -> Result<usize> {
        let base = self.registry.base_of(kind)?;
        self.counter.bump();
        let deleted = self.conn.execute(
            "DELETE FROM tree_nodes WHERE tree_base = ? AND tree_id = ?",
            params![base.as_str(), tree_id.get()],
        )?;
        Ok(deleted)
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<TreeNode> {
    Ok(TreeNode {
        id: NodeId(row.get(0)?),
        tree_id: TreeId(row.get(1)?),
        kind: NodeKind::new(row.get::<_, String>(2)?),
        parent: row.get::<_, Option<i64>>(3)?.map(NodeId),
        lft: row.get(4)?,
        rght: row.get(5)?,
        level: row.get(6)?,
    })
}
