//! The task engine — a thin contract over a tokio runtime handle.
//!
//! Everything the walrus core schedules goes through [`TaskEngine`]:
//!
//! - [`TaskEngine::submit`] — fire-and-forget.
//! - [`TaskEngine::submit_batch`] + [`WaitGroup::wait`] — run a batch and
//!   suspend the caller until every task finished.
//! - [`TaskEngine::run_blocking`] — run one synchronous closure on the
//!   blocking pool and await its result.
//!
//! Every task body runs behind a panic guard. A panicking body is logged and
//! reported as [`TaskError::Panicked`]; it never tears down a worker.

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, trace, warn};

use crate::error::{EngineError, TaskError, panic_message};
use crate::task::{Task, TaskBody, TaskPriority};
use crate::wait_group::WaitGroup;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn record<T>(&self, label: &str, priority: TaskPriority, result: &Result<T, TaskError>) {
        match result {
            Ok(_) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                trace!(task = label, priority = priority.as_str(), "task completed");
            }
            Err(err @ TaskError::Panicked { .. }) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(task = label, priority = priority.as_str(), error = %err, "task panicked");
            }
            Err(err @ TaskError::Cancelled { .. }) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(task = label, priority = priority.as_str(), error = %err, "task cancelled");
            }
        }
    }
}

/// Point-in-time task counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Tasks handed to the engine.
    pub submitted: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks that panicked or were cancelled.
    pub failed: u64,
}

/// Shared handle to the task engine. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskEngine {
    handle: Handle,
    counters: Arc<Counters>,
}

impl TaskEngine {
    /// Create an engine that submits onto the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create an engine on the runtime driving the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoRuntime`] when called outside a tokio runtime.
    pub fn current() -> Result<Self, EngineError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| EngineError::NoRuntime)
    }

    /// Returns the underlying runtime handle.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Submit a task without waiting for it.
    ///
    /// No ordering is guaranteed relative to other submissions.
    pub fn submit(&self, task: Task, priority: TaskPriority) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let fut = execute(self.handle.clone(), Arc::clone(&self.counters), task, priority);
        drop(self.handle.spawn(fut));
    }

    /// Submit a batch of tasks sharing one [`WaitGroup`].
    ///
    /// The batch tasks may run on any worker and in any order.
    #[must_use = "dropping the wait group cancels tasks that have not started"]
    pub fn submit_batch<I>(&self, tasks: I, priority: TaskPriority) -> WaitGroup
    where
        I: IntoIterator<Item = Task>,
    {
        let mut set = JoinSet::new();
        for task in tasks {
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            let fut = execute(self.handle.clone(), Arc::clone(&self.counters), task, priority);
            set.spawn_on(fut, &self.handle);
        }
        WaitGroup::new(set)
    }

    /// Run a synchronous closure on the blocking pool and await its value.
    ///
    /// The awaiting task is suspended, not parked, so its worker keeps
    /// serving other tasks meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Panicked`] if the closure panicked and
    /// [`TaskError::Cancelled`] if the runtime shut down first.
    pub async fn run_blocking<F, R>(
        &self,
        label: impl Into<Cow<'static, str>>,
        f: F,
    ) -> Result<R, TaskError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let label = label.into();
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let joined = self
            .handle
            .spawn_blocking(move || catch_unwind(AssertUnwindSafe(f)))
            .await;
        let result = settle(&label, joined);
        self.counters.record(&label, TaskPriority::Normal, &result);
        result
    }

    /// Returns a snapshot of the task counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs one task body behind the panic guard.
async fn execute(
    handle: Handle,
    counters: Arc<Counters>,
    task: Task,
    priority: TaskPriority,
) -> Result<(), TaskError> {
    let (label, body) = task.into_parts();
    if priority == TaskPriority::Low {
        tokio::task::yield_now().await;
    }

    let result = match body {
        TaskBody::Blocking(f) => {
            let joined = handle
                .spawn_blocking(move || catch_unwind(AssertUnwindSafe(f)))
                .await;
            settle(&label, joined)
        }
        TaskBody::Async(fut) => AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
            TaskError::Panicked {
                label: label.to_string(),
                message: panic_message(payload.as_ref()),
            }
        }),
    };

    counters.record(&label, priority, &result);
    result
}

fn settle<R>(
    label: &str,
    joined: Result<std::thread::Result<R>, JoinError>,
) -> Result<R, TaskError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => Err(TaskError::Panicked {
            label: label.to_string(),
            message: panic_message(payload.as_ref()),
        }),
        Err(err) if err.is_panic() => Err(TaskError::Panicked {
            label: label.to_string(),
            message: panic_message(err.into_panic().as_ref()),
        }),
        Err(_) => Err(TaskError::Cancelled {
            label: label.to_string(),
        }),
    }
}
