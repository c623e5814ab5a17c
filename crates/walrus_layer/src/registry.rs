//! Layer registry — resolves layer names to nodes without owning them.
//!
//! Each [`LayerTree`](crate::LayerTree) keeps one registry. Entries are weak
//! references, so a node that is no longer reachable from the tree simply
//! stops resolving; the registry never keeps it alive.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::LayerError;
use crate::node::LayerNode;

/// Name → node lookup table holding non-owning references.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    /// Nodes keyed by name.
    nodes: DashMap<String, Weak<LayerNode>>,
}

impl LayerRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    /// Register a node under `name`.
    ///
    /// A dead entry under the same name is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DuplicateName`] if a live node already uses
    /// the name.
    pub fn register(&self, name: &str, node: &Arc<LayerNode>) -> Result<(), LayerError> {
        match self.nodes.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().strong_count() > 0 {
                    return Err(LayerError::DuplicateName(name.to_string()));
                }
                occupied.insert(Arc::downgrade(node));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::downgrade(node));
            }
        }
        Ok(())
    }

    /// Returns `true` if a live node is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Resolve a name. Unknown names and dropped nodes yield `None`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<LayerNode>> {
        self.nodes.get(name).and_then(|weak| weak.upgrade())
    }

    /// Drop entries whose node is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, weak| weak.strong_count() > 0);
        before - self.nodes.len()
    }

    /// Names of all live registered nodes.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of live registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    /// Returns `true` if no live node is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Layer;

    struct Noop;
    impl Layer for Noop {}

    fn make_node(name: &str) -> Arc<LayerNode> {
        LayerNode::new(Some(name.to_string()), Box::new(Noop), None)
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = LayerRegistry::new();
        let node = make_node("physics");
        registry.register("physics", &node).unwrap();
        let found = registry.get("physics").unwrap();
        assert!(Arc::ptr_eq(&found, &node));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_name_is_none() {
        let registry = LayerRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_live_name_rejected() {
        let registry = LayerRegistry::new();
        let a = make_node("ai");
        let b = make_node("ai");
        registry.register("ai", &a).unwrap();
        assert_eq!(
            registry.register("ai", &b),
            Err(LayerError::DuplicateName("ai".to_string()))
        );
    }

    #[test]
    fn test_registry_does_not_keep_nodes_alive() {
        let registry = LayerRegistry::new();
        let node = make_node("ephemeral");
        registry.register("ephemeral", &node).unwrap();
        drop(node);

        assert!(registry.get("ephemeral").is_none());
        assert!(!registry.contains("ephemeral"));
        assert!(registry.names().is_empty());

        // The dead name can be reused.
        let again = make_node("ephemeral");
        registry.register("ephemeral", &again).unwrap();
        assert!(registry.contains("ephemeral"));
    }

    #[test]
    fn test_prune_removes_dead_entries() {
        let registry = LayerRegistry::new();
        let keep = make_node("keep");
        let gone = make_node("gone");
        registry.register("keep", &keep).unwrap();
        registry.register("gone", &gone).unwrap();
        drop(gone);
        assert_eq!(registry.prune(), 1);
        assert_eq!(registry.names(), vec!["keep".to_string()]);
    }
}
