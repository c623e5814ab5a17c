//! Units of work submitted to the [`TaskEngine`](crate::TaskEngine).

use std::borrow::Cow;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;

/// Scheduling priority attached to a submission.
///
/// tokio runs a single queue per worker, so priority is a hint: `Low` tasks
/// yield once before running their body, `High` and `Normal` start directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskPriority {
    /// Runtime plumbing that should not wait behind user work.
    High,
    /// The default for layer updates, timer callbacks and message delivery.
    #[default]
    Normal,
    /// Background work that may be deferred.
    Low,
}

impl TaskPriority {
    /// Short lowercase name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

/// The body of a task.
pub enum TaskBody {
    /// Synchronous user code. Runs on the runtime's blocking pool so it can
    /// sleep or compute without stalling async workers.
    Blocking(Box<dyn FnOnce() + Send + 'static>),
    /// Asynchronous runtime work. Runs on an async worker and may suspend.
    Async(BoxFuture<'static, ()>),
}

impl std::fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// A labelled unit of work.
#[derive(Debug)]
pub struct Task {
    label: Cow<'static, str>,
    body: TaskBody,
}

impl Task {
    /// Wrap a synchronous closure.
    #[must_use]
    pub fn blocking<F>(label: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label: label.into(),
            body: TaskBody::Blocking(Box::new(f)),
        }
    }

    /// Wrap a future.
    #[must_use]
    pub fn future<F>(label: impl Into<Cow<'static, str>>, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: label.into(),
            body: TaskBody::Async(fut.boxed()),
        }
    }

    /// The task's label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns `true` if the task runs on the blocking pool.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self.body, TaskBody::Blocking(_))
    }

    pub(crate) fn into_parts(self) -> (Cow<'static, str>, TaskBody) {
        (self.label, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_constructors() {
        let t = Task::blocking("cb", || {});
        assert_eq!(t.label(), "cb");
        assert!(t.is_blocking());

        let t = Task::future(format!("layer:{}", "root"), async {});
        assert_eq!(t.label(), "layer:root");
        assert!(!t.is_blocking());
    }

    #[test]
    fn test_default_priority_is_normal() {
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
        assert_eq!(TaskPriority::Low.as_str(), "low");
    }
}
