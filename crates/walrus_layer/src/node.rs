//! A single node of the layer tree and the per-subtree update algorithm.
//!
//! ## Update order
//!
//! A node always updates **before** its children:
//!
//! ```text
//! update_subtree(N):
//!   1. N.on_update(dt)                       (blocking pool)
//!   2. batch = [update_subtree(C) for C in N.children]
//!   3. wait(batch)                           (suspends, does not park)
//!   4. return                                (subtree quiescent)
//! ```
//!
//! Siblings run concurrently; a subtree finishing happens-before its
//! parent's call returns.

use std::fmt::Write as _;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};
use walrus_task::error::panic_message;
use walrus_task::{Task, TaskEngine, TaskPriority};

use crate::layer::Layer;

const ANONYMOUS: &str = "<anonymous>";

/// A node in the layer tree.
///
/// The node owns its layer and its children; the link back to the parent is
/// weak.
pub struct LayerNode {
    name: Option<String>,
    layer: Mutex<Box<dyn Layer>>,
    children: RwLock<Vec<Arc<LayerNode>>>,
    parent: Weak<LayerNode>,
    depth: usize,
    attached: AtomicBool,
}

impl std::fmt::Debug for LayerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerNode")
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("children", &self.child_count())
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl LayerNode {
    pub(crate) fn new(
        name: Option<String>,
        layer: Box<dyn Layer>,
        parent: Option<&Arc<LayerNode>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            layer: Mutex::new(layer),
            children: RwLock::new(Vec::new()),
            parent: parent.map(Arc::downgrade).unwrap_or_default(),
            depth: parent.map_or(0, |p| p.depth + 1),
            attached: AtomicBool::new(false),
        })
    }

    /// The node's name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name used in logs and tree dumps.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS)
    }

    /// Distance from the root (roots are at depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The parent node, if this is not a root and the parent is alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<LayerNode>> {
        self.parent.upgrade()
    }

    /// Snapshot of the children, in insertion order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<LayerNode>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of direct children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the node has at least one child.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    /// Find a direct child by name.
    #[must_use]
    pub fn find_child(&self, name: &str) -> Option<Arc<LayerNode>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == Some(name))
            .cloned()
    }

    /// Returns `true` once `on_attach` ran and `on_detach` has not.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// The chain of nodes from the root down to (and including) this node.
    #[must_use]
    pub fn path(self: &Arc<Self>) -> Vec<Arc<LayerNode>> {
        let mut path = vec![Arc::clone(self)];
        let mut current = self.parent();
        while let Some(node) = current {
            current = node.parent();
            path.push(node);
        }
        path.reverse();
        path
    }

    /// Create a child under this node and return it.
    pub(crate) fn push_child(
        self: &Arc<Self>,
        name: Option<String>,
        layer: Box<dyn Layer>,
    ) -> Arc<LayerNode> {
        let child = LayerNode::new(name, layer, Some(self));
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&child));
        child
    }

    fn layer(&self) -> MutexGuard<'_, Box<dyn Layer>> {
        // A layer that panicked mid-update stays usable.
        self.layer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> String {
        format!("layer:{}", self.display_name())
    }

    /// Run this node's own `on_update`, on the calling thread.
    pub fn update_layer(&self, dt: f32) {
        self.layer().on_update(dt);
    }

    /// Update this node and then its whole subtree.
    ///
    /// The returned future resolves only after every descendant finished its
    /// update. A panicking layer is logged; its descendants still update.
    pub fn update_subtree(self: &Arc<Self>, engine: &TaskEngine, dt: f32) -> BoxFuture<'static, ()> {
        let node = Arc::clone(self);
        let engine = engine.clone();
        async move {
            let target = Arc::clone(&node);
            if engine
                .run_blocking(node.label(), move || target.update_layer(dt))
                .await
                .is_err()
            {
                debug!(layer = node.display_name(), "continuing with children after failed update");
            }

            let children = node.children();
            if children.is_empty() {
                return;
            }

            let batch = children
                .iter()
                .map(|child| Task::future(child.label(), child.update_subtree(&engine, dt)));
            let report = engine.submit_batch(batch, TaskPriority::Normal).wait().await;
            if !report.is_clean() {
                warn!(
                    layer = node.display_name(),
                    failed = report.failures.len(),
                    "child subtree updates failed"
                );
            }
        }
        .boxed()
    }

    /// Pre-order `on_attach` over this subtree. Nodes already attached are
    /// skipped. Returns how many nodes were attached.
    pub(crate) fn attach_subtree(&self) -> usize {
        let mut count = 0;
        if !self.attached.swap(true, Ordering::AcqRel) {
            self.guarded("on_attach", |layer| layer.on_attach());
            count += 1;
        }
        for child in self.children() {
            count += child.attach_subtree();
        }
        count
    }

    /// Post-order `on_detach` over this subtree, children in reverse order.
    /// Returns how many nodes were detached.
    pub(crate) fn detach_subtree(&self) -> usize {
        let mut count = 0;
        for child in self.children().iter().rev() {
            count += child.detach_subtree();
        }
        if self.attached.swap(false, Ordering::AcqRel) {
            self.guarded("on_detach", |layer| layer.on_detach());
            count += 1;
        }
        count
    }

    fn guarded(&self, hook: &'static str, f: impl FnOnce(&mut dyn Layer)) {
        let mut layer = self.layer();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(layer.as_mut()))) {
            error!(
                layer = self.display_name(),
                hook,
                panic = %panic_message(payload.as_ref()),
                "layer hook panicked"
            );
        }
    }

    pub(crate) fn subtree_len(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(|child| child.subtree_len())
            .sum::<usize>()
    }

    /// Depth of the deepest node below this one, relative to this node.
    pub(crate) fn subtree_height(&self) -> usize {
        self.children()
            .iter()
            .map(|child| 1 + child.subtree_height())
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn render_into(&self, out: &mut String) {
        let _ = writeln!(out, "{}{}", "  ".repeat(self.depth), self.display_name());
        for child in self.children() {
            child.render_into(out);
        }
    }
}
