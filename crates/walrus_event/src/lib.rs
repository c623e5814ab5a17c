//! # walrus_event
//!
//! Timer service for the walrus runtime.
//!
//! - [`EventLoop`] — `set_timeout`, `set_interval`, `set_immediate`, `clear`.
//! - [`TimerId`] — opaque non-zero timer handle ([`TimerId::INVALID`] is 0).
//! - [`EventLoopConfig`] — dispatcher tuning.
//!
//! Callbacks never run on the dispatcher itself; each one is submitted to
//! the [`walrus_task::TaskEngine`] as its own task, so a slow or panicking
//! callback cannot delay or stop other timers.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use walrus_event::EventLoop;
//! use walrus_task::TaskEngine;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let event_loop = EventLoop::default();
//!     event_loop.init(TaskEngine::current().unwrap());
//!     event_loop.start();
//!
//!     let id = event_loop.set_interval(|| println!("tick"), Duration::from_millis(10));
//!     tokio::time::sleep(Duration::from_millis(35)).await;
//!     event_loop.clear(id);
//!     event_loop.stop();
//! }
//! ```

pub mod config;
pub mod event_loop;
pub mod timer;

pub use config::EventLoopConfig;
pub use event_loop::EventLoop;
pub use timer::TimerId;
