//! Application tick loop.
//!
//! Each tick:
//!
//! 1. Measure `dt` since the previous tick.
//! 2. Run one parallel update pass over the layer tree.
//! 3. Sleep out the rest of the frame budget, or warn on overrun.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use walrus_layer::LayerTree;
use walrus_task::TaskEngine;

/// Configuration for the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TickConfig {
    /// Target ticks per second.
    pub target_fps: f32,
    /// Whether ticks are paced to `target_fps`.
    pub frame_rate_limit: bool,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            frame_rate_limit: true,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// Time allotted to one tick, or `None` when ticks are unpaced.
    #[must_use]
    pub fn frame_budget(&self) -> Option<Duration> {
        if !self.frame_rate_limit || !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(1.0 / f64::from(self.target_fps)))
    }
}

/// The tick loop state.
#[derive(Debug)]
pub struct TickLoop {
    /// Ticks completed so far.
    tick_id: u64,
    config: TickConfig,
    last_tick: Option<Instant>,
}

impl TickLoop {
    /// Create a new tick loop with the given configuration.
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self {
            tick_id: 0,
            config,
            last_tick: None,
        }
    }

    /// Returns the number of ticks run so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    /// Returns the loop configuration.
    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    /// Run one tick: update every layer with the time since the last tick.
    ///
    /// Returns the `dt` that was passed to the layers. The first tick sees
    /// a `dt` of zero.
    pub async fn tick(&mut self, tree: &LayerTree, engine: &TaskEngine) -> f32 {
        let now = Instant::now();
        let dt = self
            .last_tick
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_tick = Some(now);
        self.tick_id += 1;

        debug!(tick_id = self.tick_id, dt, "tick start");
        tree.update_all(engine, dt).await;
        dt
    }

    /// Tick until `running` is cleared or `max_ticks` is reached.
    ///
    /// `running` is checked before every tick and cleared when the limit is
    /// hit. Returns the total number of ticks run.
    pub async fn run(&mut self, tree: &LayerTree, engine: &TaskEngine, running: &AtomicBool) -> u64 {
        let budget = self.config.frame_budget();
        let mut tick_count = 0u64;

        info!(
            target_fps = self.config.target_fps,
            limited = budget.is_some(),
            max_ticks = self.config.max_ticks,
            "starting tick loop"
        );

        while running.load(Ordering::Acquire) {
            let start = Instant::now();
            self.tick(tree, engine).await;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                running.store(false, Ordering::Release);
                info!(ticks = tick_count, "tick limit reached");
                break;
            }

            let elapsed = start.elapsed();
            match budget {
                Some(budget) if elapsed < budget => tokio::time::sleep(budget - elapsed).await,
                Some(budget) => warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "tick exceeded time budget"
                ),
                None => tokio::task::yield_now().await,
            }
        }

        info!(ticks = tick_count, "tick loop stopped");
        tick_count
    }
}
