//! # walrus_task
//!
//! The task engine the walrus runtime is built on.
//!
//! The engine itself is a tokio multi-threaded runtime. This crate is the
//! small contract the rest of the workspace consumes:
//!
//! - [`Task`] — a labelled blocking closure or future.
//! - [`TaskPriority`] — scheduling hint attached to a submission.
//! - [`TaskEngine`] — `submit`, `submit_batch` and `run_blocking`.
//! - [`WaitGroup`] — suspends the caller until a batch has finished.
//! - [`EngineConfig`] — builds the backing runtime.
//! - [`error`] — engine and task error types.
//!
//! ## Usage
//!
//! ```rust
//! use walrus_task::{Task, TaskEngine, TaskPriority};
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let engine = TaskEngine::current().unwrap();
//!     let batch = (0..4).map(|i| Task::blocking(format!("job-{i}"), move || {
//!         let _ = i * 2;
//!     }));
//!     let report = engine.submit_batch(batch, TaskPriority::Normal).wait().await;
//!     assert_eq!(report.completed, 4);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod task;
pub mod wait_group;

pub use config::EngineConfig;
pub use engine::{EngineStats, TaskEngine};
pub use error::{EngineError, TaskError};
pub use task::{Task, TaskBody, TaskPriority};
pub use wait_group::{WaitGroup, WaitReport};
