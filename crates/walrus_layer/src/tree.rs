//! The layer forest.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};
use walrus_task::{Task, TaskEngine, TaskPriority};

use crate::builder::LayerTreeBuilder;
use crate::error::LayerError;
use crate::layer::Layer;
use crate::node::LayerNode;
use crate::registry::LayerRegistry;

/// A forest of layers updated in parallel, one subtree barrier per node.
///
/// All methods take `&self`, so a tree can be shared behind an `Arc` and
/// extended from layer hooks or timer callbacks. Structural changes must
/// not race an [`update_all`](LayerTree::update_all) pass; nodes cannot be
/// removed once added.
#[derive(Debug, Default)]
pub struct LayerTree {
    roots: RwLock<Vec<Arc<LayerNode>>>,
    registry: LayerRegistry,
    attached: AtomicBool,
}

impl LayerTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fluent [`LayerTreeBuilder`].
    #[must_use]
    pub fn builder() -> LayerTreeBuilder {
        LayerTreeBuilder::new()
    }

    /// Add a new root layer.
    ///
    /// If the tree is already attached, the layer's `on_attach` runs before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::DuplicateName`] if the name is taken.
    pub fn push_root<'n>(
        &self,
        name: impl Into<Option<&'n str>>,
        layer: impl Layer,
    ) -> Result<Arc<LayerNode>, LayerError> {
        let node = self.insert(None, name.into(), Box::new(layer))?;
        self.attach_if_live(&node);
        Ok(node)
    }

    /// Add a layer as the last child of the layer named `parent`.
    ///
    /// If the tree is already attached, the layer's `on_attach` runs before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::UnknownLayer`] if `parent` does not resolve and
    /// [`LayerError::DuplicateName`] if `name` is taken.
    pub fn push_layer_after<'n>(
        &self,
        parent: &str,
        name: impl Into<Option<&'n str>>,
        layer: impl Layer,
    ) -> Result<Arc<LayerNode>, LayerError> {
        let parent_node = self
            .find(parent)
            .ok_or_else(|| LayerError::UnknownLayer(parent.to_string()))?;
        let node = self.insert(Some(&parent_node), name.into(), Box::new(layer))?;
        self.attach_if_live(&node);
        Ok(node)
    }

    /// Create and link a node. Used by the builder and the push methods.
    pub(crate) fn insert(
        &self,
        parent: Option<&Arc<LayerNode>>,
        name: Option<&str>,
        layer: Box<dyn Layer>,
    ) -> Result<Arc<LayerNode>, LayerError> {
        if let Some(name) = name.filter(|name| self.registry.contains(name)) {
            return Err(LayerError::DuplicateName(name.to_string()));
        }

        let owned_name = name.map(str::to_string);
        let node = match parent {
            Some(parent) => parent.push_child(owned_name, layer),
            None => {
                let node = LayerNode::new(owned_name, layer, None);
                self.roots
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(Arc::clone(&node));
                node
            }
        };

        if let Some(name) = name {
            self.registry.register(name, &node)?;
        }
        debug!(
            layer = node.display_name(),
            depth = node.depth(),
            "layer added"
        );
        Ok(node)
    }

    fn attach_if_live(&self, node: &Arc<LayerNode>) {
        if self.is_attached() {
            node.attach_subtree();
        }
    }

    /// Resolve a named layer. Unknown names yield `None`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<LayerNode>> {
        self.registry.get(name)
    }

    /// The name registry backing [`find`](LayerTree::find).
    #[must_use]
    pub fn registry(&self) -> &LayerRegistry {
        &self.registry
    }

    /// Snapshot of the roots, in insertion order.
    #[must_use]
    pub fn roots(&self) -> Vec<Arc<LayerNode>> {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of roots.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total number of nodes in the forest.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots().iter().map(|root| root.subtree_len()).sum()
    }

    /// Returns `true` if the forest has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root_count() == 0
    }

    /// Number of levels in the deepest tree (0 for an empty forest).
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.roots()
            .iter()
            .map(|root| 1 + root.subtree_height())
            .max()
            .unwrap_or(0)
    }

    /// Indented dump of the forest, one node per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            root.render_into(&mut out);
        }
        out
    }

    /// Returns `true` between [`attach_all`](LayerTree::attach_all) and
    /// [`detach_all`](LayerTree::detach_all).
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Run `on_attach` over the forest, sequentially and pre-order.
    ///
    /// Each node is attached at most once. Returns how many nodes were
    /// attached by this call.
    pub fn attach_all(&self) -> usize {
        self.attached.store(true, Ordering::Release);
        let count: usize = self.roots().iter().map(|root| root.attach_subtree()).sum();
        info!(layers = count, "layers attached");
        count
    }

    /// Run `on_detach` over the forest, sequentially and post-order (the
    /// reverse of attach order).
    ///
    /// Returns how many nodes were detached by this call.
    pub fn detach_all(&self) -> usize {
        self.attached.store(false, Ordering::Release);
        let count: usize = self
            .roots()
            .iter()
            .rev()
            .map(|root| root.detach_subtree())
            .sum();
        info!(layers = count, "layers detached");
        count
    }

    /// One parallel update pass over the forest.
    ///
    /// Every root subtree is submitted as one batch; the future resolves
    /// after every node in the forest finished `on_update(dt)`.
    pub async fn update_all(&self, engine: &TaskEngine, dt: f32) {
        let roots = self.roots();
        if roots.is_empty() {
            return;
        }

        let start = Instant::now();
        let batch = roots.iter().map(|root| {
            Task::future(
                format!("subtree:{}", root.display_name()),
                root.update_subtree(engine, dt),
            )
        });
        let report = engine.submit_batch(batch, TaskPriority::Normal).wait().await;

        if !report.is_clean() {
            warn!(
                failed = report.failures.len(),
                "root subtree updates failed"
            );
        }
        debug!(
            roots = roots.len(),
            dt,
            elapsed_us = start.elapsed().as_micros() as u64,
            "layer tree updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    /// Records hook calls into a shared journal.
    struct Probe {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
        updates: Arc<AtomicUsize>,
        work: Duration,
        panic_on_update: bool,
    }

    impl Probe {
        fn new(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                journal: Arc::clone(journal),
                updates: Arc::new(AtomicUsize::new(0)),
                work: Duration::ZERO,
                panic_on_update: false,
            }
        }

        fn working(mut self, work: Duration) -> Self {
            self.work = work;
            self
        }

        fn panicking(mut self) -> Self {
            self.panic_on_update = true;
            self
        }

        fn counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.updates)
        }

        fn log(&self, event: &str) {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{event}:{}", self.name));
        }
    }

    impl Layer for Probe {
        fn on_attach(&mut self) {
            self.log("attach");
        }

        fn on_update(&mut self, _dt: f32) {
            if self.panic_on_update {
                panic!("layer {} failed", self.name);
            }
            self.log("begin");
            if !self.work.is_zero() {
                std::thread::sleep(self.work);
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.log("end");
        }

        fn on_detach(&mut self) {
            self.log("detach");
        }
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn position(journal: &Arc<Mutex<Vec<String>>>, entry: &str) -> usize {
        journal
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing journal entry {entry}"))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_siblings_update_in_parallel() {
        let engine = TaskEngine::current().unwrap();
        let j = journal();
        let a = Probe::new("a", &j).working(Duration::from_millis(150));
        let b = Probe::new("b", &j).working(Duration::from_millis(150));
        let (a_count, b_count) = (a.counter(), b.counter());

        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .child("a", a)
            .back()
            .child("b", b)
            .build()
            .unwrap();

        let start = Instant::now();
        tree.update_all(&engine, 0.016).await;
        let elapsed = start.elapsed();

        assert_eq!(a_count.load(Ordering::SeqCst), 1);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert!(
            elapsed < Duration::from_millis(280),
            "siblings ran sequentially: {elapsed:?}"
        );
        assert!(elapsed >= Duration::from_millis(150));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parent_updates_before_children_and_waits_for_subtree() {
        let engine = TaskEngine::current().unwrap();
        let j = journal();

        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .child("mid", Probe::new("mid", &j))
            .child("leaf", Probe::new("leaf", &j).working(Duration::from_millis(50)))
            .to_root()
            .child("side", Probe::new("side", &j))
            .build()
            .unwrap();

        tree.update_all(&engine, 0.016).await;

        // Every update finished before update_all returned.
        assert_eq!(j.lock().unwrap().len(), 8);
        assert!(position(&j, "end:root") < position(&j, "begin:mid"));
        assert!(position(&j, "end:root") < position(&j, "begin:side"));
        assert!(position(&j, "end:mid") < position(&j, "begin:leaf"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_multiple_roots_and_repeated_ticks() {
        let engine = TaskEngine::current().unwrap();
        let j = journal();
        let r1 = Probe::new("r1", &j);
        let r2 = Probe::new("r2", &j);
        let (c1, c2) = (r1.counter(), r2.counter());

        let tree = LayerTree::builder()
            .root("r1", r1)
            .root("r2", r2)
            .build()
            .unwrap();
        assert_eq!(tree.root_count(), 2);

        for _ in 0..3 {
            tree.update_all(&engine, 0.016).await;
        }
        assert_eq!(c1.load(Ordering::SeqCst), 3);
        assert_eq!(c2.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_layer_does_not_stop_pass() {
        let engine = TaskEngine::current().unwrap();
        let j = journal();
        let child = Probe::new("child", &j);
        let sibling = Probe::new("sibling", &j);
        let (child_count, sibling_count) = (child.counter(), sibling.counter());

        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .child("broken", Probe::new("broken", &j).panicking())
            .child("child", child)
            .to("root")
            .child("sibling", sibling)
            .build()
            .unwrap();

        tree.update_all(&engine, 0.016).await;
        tree.update_all(&engine, 0.016).await;

        assert_eq!(child_count.load(Ordering::SeqCst), 2);
        assert_eq!(sibling_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_tree_update_is_noop() {
        let engine = TaskEngine::current().unwrap();
        let tree = LayerTree::new();
        tree.update_all(&engine, 0.016).await;
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.max_depth(), 0);
    }

    #[test]
    fn test_attach_preorder_detach_reverse_once() {
        let j = journal();
        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .child("a", Probe::new("a", &j))
            .child("a1", Probe::new("a1", &j))
            .to_root()
            .child("b", Probe::new("b", &j))
            .build()
            .unwrap();

        assert_eq!(tree.attach_all(), 4);
        assert_eq!(tree.attach_all(), 0);
        assert_eq!(tree.detach_all(), 4);
        assert_eq!(tree.detach_all(), 0);

        let entries = j.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                "attach:root",
                "attach:a",
                "attach:a1",
                "attach:b",
                "detach:b",
                "detach:a1",
                "detach:a",
                "detach:root",
            ]
        );
    }

    #[test]
    fn test_push_layer_after_attaches_into_live_tree() {
        let j = journal();
        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .build()
            .unwrap();
        tree.attach_all();

        let node = tree
            .push_layer_after("root", "late", Probe::new("late", &j))
            .unwrap();
        assert!(node.is_attached());
        assert_eq!(node.depth(), 1);
        assert!(Arc::ptr_eq(&tree.find("late").unwrap(), &node));
        assert!(j.lock().unwrap().contains(&"attach:late".to_string()));

        assert_eq!(
            tree.push_layer_after("ghost", None, Probe::new("x", &j))
                .unwrap_err(),
            LayerError::UnknownLayer("ghost".to_string())
        );
        assert_eq!(
            tree.push_root("late", Probe::new("dup", &j)).unwrap_err(),
            LayerError::DuplicateName("late".to_string())
        );
    }

    #[test]
    fn test_push_into_detached_tree_defers_attach() {
        let j = journal();
        let tree = LayerTree::new();
        let root = tree.push_root("root", Probe::new("root", &j)).unwrap();
        assert!(!root.is_attached());
        assert!(j.lock().unwrap().is_empty());
        tree.attach_all();
        assert!(root.is_attached());
    }

    #[test]
    fn test_introspection() {
        let j = journal();
        let tree = LayerTree::builder()
            .root("root", Probe::new("root", &j))
            .child("a", Probe::new("a", &j))
            .child(None, Probe::new("anon", &j))
            .to_root()
            .child("b", Probe::new("b", &j))
            .root("other", Probe::new("other", &j))
            .build()
            .unwrap();

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.root_count(), 2);
        assert_eq!(tree.max_depth(), 3);
        assert_eq!(tree.registry().len(), 4);
        assert_eq!(
            tree.render(),
            "root\n  a\n    <anonymous>\n  b\nother\n"
        );
    }
}
