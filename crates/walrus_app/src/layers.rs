//! Ready-made layers for demos and smoke tests.

use std::hint::black_box;
use std::time::Duration;

use tracing::{debug, info};
use walrus_layer::Layer;

use crate::app::AppHandle;

/// Logs its lifecycle and optionally sleeps on every update to simulate
/// work.
#[derive(Debug)]
pub struct ExampleLayer {
    name: String,
    work: Duration,
    updates: u64,
}

impl ExampleLayer {
    /// Create a layer that does no work.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work: Duration::ZERO,
            updates: 0,
        }
    }

    /// Sleep for `work` on every update.
    #[must_use]
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Number of updates so far.
    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Layer for ExampleLayer {
    fn on_attach(&mut self) {
        info!(layer = %self.name, "layer attached");
    }

    fn on_update(&mut self, dt: f32) {
        self.updates += 1;
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        if self.updates % 60 == 0 {
            debug!(layer = %self.name, updates = self.updates, dt, "layer update");
        }
    }

    fn on_detach(&mut self) {
        info!(layer = %self.name, updates = self.updates, "layer detached");
    }
}

/// Burns CPU on every update.
#[derive(Debug)]
pub struct HeavyComputeLayer {
    name: String,
    iterations: u32,
    updates: u64,
    last_result: f64,
}

impl HeavyComputeLayer {
    /// Create a layer running `iterations` trig steps per update.
    #[must_use]
    pub fn new(name: impl Into<String>, iterations: u32) -> Self {
        Self {
            name: name.into(),
            iterations,
            updates: 0,
            last_result: 0.0,
        }
    }

    /// Result of the most recent update.
    #[must_use]
    pub fn last_result(&self) -> f64 {
        self.last_result
    }

    fn compute(&self) -> f64 {
        (0..self.iterations)
            .map(|i| {
                let x = f64::from(black_box(i));
                (x * 0.001).sin() * (x * 0.002).cos()
            })
            .sum()
    }
}

impl Layer for HeavyComputeLayer {
    fn on_attach(&mut self) {
        info!(layer = %self.name, iterations = self.iterations, "compute layer attached");
    }

    fn on_update(&mut self, _dt: f32) {
        self.updates += 1;
        self.last_result = self.compute();
        if self.updates % 30 == 0 {
            debug!(
                layer = %self.name,
                updates = self.updates,
                result = self.last_result,
                "compute layer update"
            );
        }
    }

    fn on_detach(&mut self) {
        info!(layer = %self.name, updates = self.updates, "compute layer detached");
    }
}

/// Closes the application a fixed time after it is attached.
#[derive(Debug)]
pub struct CloseAfter {
    handle: AppHandle,
    after: Duration,
}

impl CloseAfter {
    /// Close the application `after` the layer is attached.
    #[must_use]
    pub fn new(handle: AppHandle, after: Duration) -> Self {
        Self { handle, after }
    }
}

impl Layer for CloseAfter {
    fn on_attach(&mut self) {
        let handle = self.handle.clone();
        let after = self.after;
        self.handle.set_timeout(
            move || {
                info!(after_ms = after.as_millis() as u64, "shutting down");
                handle.close();
            },
            after,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AppConfig, Application};

    #[test]
    fn test_example_layer_counts_updates() {
        let mut layer = ExampleLayer::new("example").with_work(Duration::from_millis(1));
        layer.on_attach();
        for _ in 0..3 {
            layer.on_update(0.016);
        }
        layer.on_detach();
        assert_eq!(layer.updates(), 3);
    }

    #[test]
    fn test_heavy_compute_is_deterministic() {
        let mut a = HeavyComputeLayer::new("a", 10_000);
        let mut b = HeavyComputeLayer::new("b", 10_000);
        a.on_update(0.016);
        b.on_update(0.016);
        assert_eq!(a.last_result(), b.last_result());
        assert_ne!(a.last_result(), 0.0);
    }

    #[test]
    fn test_close_after_ends_run() {
        let config = AppConfig::default()
            .with_target_fps(200.0)
            .with_max_ticks(2000);
        let app = Application::new(config).unwrap();
        app.push_layer("closer", CloseAfter::new(app.handle(), Duration::from_millis(30)))
            .unwrap();
        app.push_layer("work", ExampleLayer::new("work")).unwrap();

        let summary = app.run();
        assert!(summary.ticks < 2000);
        assert!(summary.elapsed >= Duration::from_millis(30));
    }
}
