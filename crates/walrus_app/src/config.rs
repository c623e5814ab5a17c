//! Application configuration and presets.
//!
//! [`AppConfig`] is plain data. It can be built in code, picked from a named
//! preset, or read from JSON; missing JSON fields take their default value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use walrus_event::EventLoopConfig;
use walrus_task::EngineConfig;

use crate::error::AppError;
use crate::tick::TickConfig;

/// Names accepted by [`AppConfig::preset`].
pub const PRESETS: &[&str] = &[
    "default",
    "high_performance",
    "power_efficient",
    "background_service",
    "max_throughput",
    "ultra_low_power",
    "ultra_high_performance",
];

/// Configuration for an [`Application`](crate::Application).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Human-readable application name, used in logs.
    pub name: String,
    /// Target ticks per second.
    pub target_fps: f32,
    /// Whether ticks are paced to `target_fps`.
    pub frame_rate_limit: bool,
    /// Engine worker threads (0 = one per hardware thread).
    pub worker_threads: usize,
    /// Upper bound on threads running blocking user code.
    pub max_blocking_threads: usize,
    /// Longest the timer dispatcher sleeps between checks, in milliseconds.
    pub timer_max_delay_ms: u64,
    /// Whether an in-memory broker is created.
    pub enable_pubsub: bool,
    /// Stop after this many ticks (0 = run until closed).
    pub max_ticks: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Walrus App".to_string(),
            target_fps: 60.0,
            frame_rate_limit: true,
            worker_threads: 0,
            max_blocking_threads: 400,
            timer_max_delay_ms: 100,
            enable_pubsub: true,
            max_ticks: 0,
        }
    }
}

impl AppConfig {
    /// 144 Hz on every hardware thread with a large blocking pool.
    #[must_use]
    pub fn high_performance() -> Self {
        Self {
            name: "High Performance App".to_string(),
            target_fps: 144.0,
            max_blocking_threads: 1000,
            ..Self::default()
        }
    }

    /// 30 Hz on two workers.
    #[must_use]
    pub fn power_efficient() -> Self {
        Self {
            name: "Power Efficient App".to_string(),
            target_fps: 30.0,
            worker_threads: 2,
            max_blocking_threads: 50,
            ..Self::default()
        }
    }

    /// 60 Hz on eight workers with a small blocking pool.
    #[must_use]
    pub fn background_service() -> Self {
        Self {
            name: "Background Service".to_string(),
            worker_threads: 8,
            max_blocking_threads: 100,
            ..Self::default()
        }
    }

    /// Unpaced ticks on every hardware thread.
    #[must_use]
    pub fn max_throughput() -> Self {
        Self {
            name: "Max Throughput App".to_string(),
            frame_rate_limit: false,
            max_blocking_threads: 2000,
            ..Self::default()
        }
    }

    /// One tick per second on two workers.
    #[must_use]
    pub fn ultra_low_power() -> Self {
        Self {
            name: "Ultra Low Power App".to_string(),
            target_fps: 1.0,
            worker_threads: 2,
            max_blocking_threads: 10,
            ..Self::default()
        }
    }

    /// 240 Hz on every hardware thread with tight timer dispatch.
    #[must_use]
    pub fn ultra_high_performance() -> Self {
        Self {
            name: "Ultra High Performance App".to_string(),
            target_fps: 240.0,
            max_blocking_threads: 2000,
            timer_max_delay_ms: 10,
            ..Self::default()
        }
    }

    /// Look up a preset by name (see [`PRESETS`]). Dashes are accepted in
    /// place of underscores.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UnknownPreset`] for any other name.
    pub fn preset(name: &str) -> Result<Self, AppError> {
        match name.replace('-', "_").as_str() {
            "default" => Ok(Self::default()),
            "high_performance" => Ok(Self::high_performance()),
            "power_efficient" => Ok(Self::power_efficient()),
            "background_service" => Ok(Self::background_service()),
            "max_throughput" => Ok(Self::max_throughput()),
            "ultra_low_power" => Ok(Self::ultra_low_power()),
            "ultra_high_performance" => Ok(Self::ultra_high_performance()),
            _ => Err(AppError::UnknownPreset(name.to_string())),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the document is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConfigIo`] if the file cannot be read and
    /// [`AppError::Config`] if it is malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| AppError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Override the application name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Override the target tick rate.
    #[must_use]
    pub fn with_target_fps(mut self, fps: f32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Enable or disable the broker.
    #[must_use]
    pub fn with_pubsub(mut self, enabled: bool) -> Self {
        self.enable_pubsub = enabled;
        self
    }

    /// The task engine settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_worker_threads(self.worker_threads)
            .with_max_blocking_threads(self.max_blocking_threads)
    }

    /// The event loop settings.
    #[must_use]
    pub fn event_loop_config(&self) -> EventLoopConfig {
        EventLoopConfig::default()
            .with_max_dispatch_delay(Duration::from_millis(self.timer_max_delay_ms))
    }

    /// The tick loop settings.
    #[must_use]
    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            target_fps: self.target_fps,
            frame_rate_limit: self.frame_rate_limit,
            max_ticks: self.max_ticks,
        }
    }
}
