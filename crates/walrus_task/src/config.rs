//! Engine configuration.

use tokio::runtime::{Builder, Runtime};

use crate::error::EngineError;

/// Default cap on blocking-pool threads (tokio's own default).
pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;

/// Configuration for the runtime backing a [`TaskEngine`](crate::TaskEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of async worker threads. `0` uses one per hardware thread.
    pub worker_threads: usize,
    /// Upper bound on threads running blocking task bodies.
    pub max_blocking_threads: usize,
    /// Name given to runtime threads.
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            max_blocking_threads: DEFAULT_MAX_BLOCKING_THREADS,
            thread_name: "walrus-worker".to_string(),
        }
    }
}

impl EngineConfig {
    /// Override the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = n;
        self
    }

    /// Override the blocking-pool cap. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_blocking_threads(mut self, n: usize) -> Self {
        self.max_blocking_threads = n.max(1);
        self
    }

    /// Build a multi-threaded tokio runtime from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Build`] if the runtime cannot be created.
    pub fn build_runtime(&self) -> Result<Runtime, EngineError> {
        let mut builder = Builder::new_multi_thread();
        builder
            .enable_all()
            .thread_name(self.thread_name.clone())
            .max_blocking_threads(self.max_blocking_threads.max(1));
        if self.worker_threads > 0 {
            builder.worker_threads(self.worker_threads);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.worker_threads, 0);
        assert_eq!(cfg.max_blocking_threads, DEFAULT_MAX_BLOCKING_THREADS);
    }

    #[test]
    fn test_blocking_cap_never_zero() {
        let cfg = EngineConfig::default().with_max_blocking_threads(0);
        assert_eq!(cfg.max_blocking_threads, 1);
    }

    #[test]
    fn test_build_runtime() {
        let rt = EngineConfig::default()
            .with_worker_threads(2)
            .build_runtime()
            .unwrap();
        let answer = rt.block_on(async { 40 + 2 });
        assert_eq!(answer, 42);
    }
}
