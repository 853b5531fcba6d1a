//! Kind registry: which tree base each node kind lives under
//!
//! Several concrete kinds can share one tree (a `redirect_page` inside a
//! `page` tree). Queries must go through the common base so the whole
//! tree is visible as one structure. The registry resolves every kind to
//! its base once, when it is built at startup, and is handed to the store
//! explicitly.

use std::collections::HashMap;

use crate::error::{Result, StoreError};
use crate::models::NodeKind;

#[derive(Debug, Clone)]
pub struct KindRegistry {
    bases: HashMap<NodeKind, NodeKind>,
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder::default()
    }

    /// The tree base `kind` belongs to
    pub fn base_of(&self, kind: &NodeKind) -> Result<&NodeKind> {
        self.bases
            .get(kind)
            .ok_or_else(|| StoreError::invalid(format!("node kind '{}' is not registered", kind)))
    }

    pub fn is_registered(&self, kind: &NodeKind) -> bool {
        self.bases.contains_key(kind)
    }

    /// All kinds sharing `base`'s trees, including the base itself
    pub fn kinds_in(&self, base: &NodeKind) -> Vec<&NodeKind> {
        let mut kinds: Vec<&NodeKind> = self
            .bases
            .iter()
            .filter(|(_, b)| *b == base)
            .map(|(kind, _)| kind)
            .collect();
        kinds.sort();
        kinds
    }
}

impl Default for KindRegistry {
    /// Email parts, plus the CMS page hierarchy
    fn default() -> Self {
        let part = NodeKind::part();
        let page = NodeKind::new(NodeKind::PAGE);
        let bases = [
            (part.clone(), part),
            (page.clone(), page.clone()),
            (NodeKind::new("redirect_page"), page.clone()),
            (NodeKind::new("section_page"), page),
        ];
        Self {
            bases: bases.into_iter().collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct KindRegistryBuilder {
    // kind -> declared parent kind (None for a tree base)
    declared: Vec<(NodeKind, Option<NodeKind>)>,
}

impl KindRegistryBuilder {
    /// Register a kind that owns its own trees
    pub fn base(mut self, kind: impl Into<NodeKind>) -> Self {
        self.declared.push((kind.into(), None));
        self
    }

    /// Register a kind stored in the trees of `parent` (itself a base or
    /// another subtype)
    pub fn subtype(mut self, kind: impl Into<NodeKind>, parent: impl Into<NodeKind>) -> Self {
        self.declared.push((kind.into(), Some(parent.into())));
        self
    }

    /// Resolve every kind to its tree base.
    ///
    /// Fails on duplicate kinds, unknown parents and cycles.
    pub fn build(self) -> Result<KindRegistry> {
        let mut parents: HashMap<NodeKind, Option<NodeKind>> = HashMap::new();
        for (kind, parent) in self.declared {
            if parents.insert(kind.clone(), parent).is_some() {
                return Err(StoreError::invalid(format!(
                    "node kind '{}' registered twice",
                    kind
                )));
            }
        }

        let mut bases = HashMap::with_capacity(parents.len());
        for kind in parents.keys() {
            let mut current = kind;
            let mut steps = 0;
            let base = loop {
                match parents.get(current) {
                    Some(None) => break current.clone(),
                    Some(Some(parent)) => current = parent,
                    None => {
                        return Err(StoreError::invalid(format!(
                            "node kind '{}' has unregistered parent '{}'",
                            kind, current
                        )));
                    }
                }
                steps += 1;
                if steps > parents.len() {
                    return Err(StoreError::invalid(format!(
                        "node kind '{}' is part of an inheritance cycle",
                        kind
                    )));
                }
            };
            bases.insert(kind.clone(), base);
        }

        Ok(KindRegistry { bases })
    }
}
