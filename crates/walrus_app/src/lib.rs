//! # walrus_app
//!
//! Application context for the walrus runtime.
//!
//! - [`Application`] — owns the runtime, event loop, broker and layer tree,
//!   and drives them through [`Application::run`].
//! - [`AppHandle`] — cloneable access to those services for layers and
//!   callbacks.
//! - [`AppConfig`] — plain-data configuration with named presets and JSON
//!   loading.
//! - [`TickLoop`] — measures `dt`, updates the tree, paces ticks.
//! - [`layers`] — ready-made layers for demos.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use walrus_app::{AppConfig, Application};
//! use walrus_app::layers::{CloseAfter, ExampleLayer};
//!
//! let app = Application::new(AppConfig::power_efficient()).unwrap();
//! app.push_layer("closer", CloseAfter::new(app.handle(), Duration::from_secs(1)))
//!     .unwrap();
//! app.push_layer("example", ExampleLayer::new("example")).unwrap();
//! let summary = app.run();
//! println!("ran {} ticks", summary.ticks);
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod layers;
pub mod tick;

pub use app::{AppHandle, Application, RunSummary};
pub use config::{AppConfig, PRESETS};
pub use error::AppError;
pub use tick::{TickConfig, TickLoop};
