//! Event loop configuration.

use std::time::Duration;

use walrus_task::TaskPriority;

/// Default upper bound on how long the dispatcher sleeps between cycles.
pub const DEFAULT_MAX_DISPATCH_DELAY: Duration = Duration::from_millis(100);

/// Shortest interval accepted by `set_interval`.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for an [`EventLoop`](crate::EventLoop).
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Longest the dispatcher sleeps before re-checking the heap. Bounds the
    /// latency of clears and of timers scheduled while it sleeps.
    pub max_dispatch_delay: Duration,
    /// Priority used when submitting timer callbacks.
    pub callback_priority: TaskPriority,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            max_dispatch_delay: DEFAULT_MAX_DISPATCH_DELAY,
            callback_priority: TaskPriority::Normal,
        }
    }
}

impl EventLoopConfig {
    /// Override the dispatcher's maximum sleep. Zero is raised to 1 ms.
    #[must_use]
    pub fn with_max_dispatch_delay(mut self, delay: Duration) -> Self {
        self.max_dispatch_delay = delay.max(Duration::from_millis(1));
        self
    }
}
