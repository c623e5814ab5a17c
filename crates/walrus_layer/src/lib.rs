//! # walrus_layer
//!
//! Hierarchical parallel updates for the walrus runtime.
//!
//! This crate provides:
//!
//! - [`Layer`] — the `on_attach` / `on_update` / `on_detach` contract.
//! - [`LayerTree`] — a forest of named layers with `update_all(dt)`.
//! - [`LayerTreeBuilder`] — fluent construction with a cursor
//!   (`root`, `child`, `back`, `to_root`, `to`).
//! - [`LayerNode`] — one node: owned layer, owned children, weak parent.
//! - [`LayerRegistry`] — name lookup that never owns nodes.
//!
//! ## Update model
//!
//! ```text
//!            root            update_all(dt):
//!           /    \             batch[root subtrees] ─► wait
//!          A      B          update_subtree(N):
//!         / \                  N.on_update(dt)
//!       A1   A2                batch[child subtrees] ─► wait
//! ```
//!
//! Siblings (A and B, A1 and A2) run concurrently. A node updates before
//! its children, and a call for a node returns only once its whole subtree
//! is done.

pub mod builder;
pub mod error;
pub mod layer;
pub mod node;
pub mod registry;
pub mod tree;

pub use builder::LayerTreeBuilder;
pub use error::LayerError;
pub use layer::Layer;
pub use node::LayerNode;
pub use registry::LayerRegistry;
pub use tree::LayerTree;
