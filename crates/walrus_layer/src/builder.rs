//! Fluent construction of a [`LayerTree`].
//!
//! ```rust
//! use walrus_layer::{Layer, LayerTree};
//!
//! struct Noop;
//! impl Layer for Noop {}
//!
//! let tree = LayerTree::builder()
//!     .root("root", Noop)
//!         .child("child1", Noop)
//!             .child("grandchild", Noop)
//!         .back()
//!         .child("child2", Noop)
//!     .build()
//!     .unwrap();
//! assert_eq!(tree.len(), 4);
//! ```
//!
//! The builder keeps a cursor stack. `child` adds under the top of the stack
//! and pushes the new node; `back` pops one level; `to_root` returns to the
//! first root ever created; `to` jumps to any named node. The first error is
//! kept and returned from [`LayerTreeBuilder::build`]; later calls are
//! ignored.

use std::sync::Arc;

use tracing::debug;

use crate::error::LayerError;
use crate::layer::Layer;
use crate::node::LayerNode;
use crate::tree::LayerTree;

/// Builder for a [`LayerTree`].
#[derive(Debug, Default)]
pub struct LayerTreeBuilder {
    tree: LayerTree,
    cursor: Vec<Arc<LayerNode>>,
    first_root: Option<Arc<LayerNode>>,
    error: Option<LayerError>,
}

impl LayerTreeBuilder {
    /// Create a builder for an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root and move the cursor onto it.
    #[must_use]
    pub fn root<'n>(mut self, name: impl Into<Option<&'n str>>, layer: impl Layer) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.tree.insert(None, name.into(), Box::new(layer)) {
            Ok(node) => {
                self.first_root.get_or_insert_with(|| Arc::clone(&node));
                self.cursor = vec![node];
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Add a child under the cursor and descend into it.
    #[must_use]
    pub fn child<'n>(mut self, name: impl Into<Option<&'n str>>, layer: impl Layer) -> Self {
        if self.error.is_some() {
            return self;
        }
        let Some(parent) = self.cursor.last().cloned() else {
            self.error = Some(LayerError::NoCursor);
            return self;
        };
        match self.tree.insert(Some(&parent), name.into(), Box::new(layer)) {
            Ok(node) => self.cursor.push(node),
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Move the cursor up one level. Stays put at the bottom of the stack.
    #[must_use]
    pub fn back(mut self) -> Self {
        if self.cursor.len() > 1 {
            self.cursor.pop();
        } else {
            debug!("layer builder back() at top level; ignored");
        }
        self
    }

    /// Move the cursor to the first root ever created.
    #[must_use]
    pub fn to_root(mut self) -> Self {
        if let Some(root) = &self.first_root {
            self.cursor = vec![Arc::clone(root)];
        }
        self
    }

    /// Move the cursor to the named node. `back` then walks its ancestors.
    #[must_use]
    pub fn to(mut self, name: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.tree.find(name) {
            Some(node) => self.cursor = node.path(),
            None => self.error = Some(LayerError::UnknownLayer(name.to_string())),
        }
        self
    }

    /// Finish building.
    ///
    /// # Errors
    ///
    /// Returns the first error hit while building: [`LayerError::NoCursor`],
    /// [`LayerError::UnknownLayer`] or [`LayerError::DuplicateName`].
    pub fn build(self) -> Result<LayerTree, LayerError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.tree),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Layer for Noop {}

    fn child_names(tree: &LayerTree, name: &str) -> Vec<String> {
        tree.find(name)
            .unwrap()
            .children()
            .iter()
            .map(|c| c.display_name().to_string())
            .collect()
    }

    #[test]
    fn test_child_descends_and_back_ascends() {
        let tree = LayerTree::builder()
            .root("root", Noop)
            .child("a", Noop)
            .child("a1", Noop)
            .back()
            .child("a2", Noop)
            .back()
            .back()
            .child("b", Noop)
            .build()
            .unwrap();

        assert_eq!(child_names(&tree, "root"), vec!["a", "b"]);
        assert_eq!(child_names(&tree, "a"), vec!["a1", "a2"]);
    }

    #[test]
    fn test_back_never_pops_last_level() {
        let tree = LayerTree::builder()
            .root("root", Noop)
            .back()
            .back()
            .child("a", Noop)
            .build()
            .unwrap();
        assert_eq!(child_names(&tree, "root"), vec!["a"]);
    }

    #[test]
    fn test_to_root_targets_first_root() {
        let tree = LayerTree::builder()
            .root("first", Noop)
            .root("second", Noop)
            .child("s1", Noop)
            .to_root()
            .child("f1", Noop)
            .build()
            .unwrap();

        assert_eq!(child_names(&tree, "first"), vec!["f1"]);
        assert_eq!(child_names(&tree, "second"), vec!["s1"]);
    }

    #[test]
    fn test_to_jumps_to_named_node_with_ancestry() {
        let tree = LayerTree::builder()
            .root("root", Noop)
            .child("a", Noop)
            .child("a1", Noop)
            .to_root()
            .child("b", Noop)
            .to("a1")
            .child("deep", Noop)
            .back()
            .back()
            .child("a2", Noop)
            .build()
            .unwrap();

        assert_eq!(child_names(&tree, "a1"), vec!["deep"]);
        assert_eq!(child_names(&tree, "a"), vec!["a1", "a2"]);
        assert_eq!(tree.find("deep").unwrap().depth(), 3);
    }

    #[test]
    fn test_child_without_root_fails() {
        let err = LayerTree::builder().child("orphan", Noop).build().unwrap_err();
        assert_eq!(err, LayerError::NoCursor);
    }

    #[test]
    fn test_to_unknown_fails() {
        let err = LayerTree::builder()
            .root("root", Noop)
            .to("missing")
            .build()
            .unwrap_err();
        assert_eq!(err, LayerError::UnknownLayer("missing".to_string()));
    }

    #[test]
    fn test_duplicate_name_fails_and_first_error_wins() {
        let err = LayerTree::builder()
            .root("root", Noop)
            .child("dup", Noop)
            .child("dup", Noop)
            .to("missing")
            .build()
            .unwrap_err();
        assert_eq!(err, LayerError::DuplicateName("dup".to_string()));
    }

    #[test]
    fn test_anonymous_nodes_allowed() {
        let tree = LayerTree::builder()
            .root(None, Noop)
            .child(None, Noop)
            .child(None, Noop)
            .build()
            .unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.registry().is_empty());
    }
}
