//! The [`Layer`] trait — the contract every update target implements.

/// An independently updating component placed in a
/// [`LayerTree`](crate::LayerTree).
///
/// All three hooks default to no-ops.
///
/// - `on_attach` runs once when the node joins an attached tree.
/// - `on_update` runs once per tick, possibly on a different thread each
///   time, and never concurrently with itself.
/// - `on_detach` runs once at teardown.
///
/// # Examples
///
/// ```rust
/// use walrus_layer::Layer;
///
/// struct Physics {
///     steps: u64,
/// }
///
/// impl Layer for Physics {
///     fn on_update(&mut self, _dt: f32) {
///         self.steps += 1;
///     }
/// }
/// ```
pub trait Layer: Send + 'static {
    /// Called once when the layer is attached.
    fn on_attach(&mut self) {}

    /// Called every tick with the elapsed time in seconds.
    fn on_update(&mut self, _dt: f32) {}

    /// Called once when the layer is detached.
    fn on_detach(&mut self) {}
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn on_attach(&mut self) {
        (**self).on_attach();
    }

    fn on_update(&mut self, dt: f32) {
        (**self).on_update(dt);
    }

    fn on_detach(&mut self) {
        (**self).on_detach();
    }
}
