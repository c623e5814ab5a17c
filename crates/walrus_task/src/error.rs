//! Task-engine error types.

use std::any::Any;

/// Errors raised while constructing or locating a task engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No tokio runtime is active on the calling thread.
    #[error("no tokio runtime is active on this thread")]
    NoRuntime,

    /// The tokio runtime could not be built.
    #[error("failed to build runtime: {0}")]
    Build(#[from] std::io::Error),
}

/// Outcome of a single task that did not finish normally.
///
/// Task failures are always contained at the task boundary; they are reported
/// back to whoever waits on the task but never unwind into the runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The task body panicked.
    #[error("task '{label}' panicked: {message}")]
    Panicked {
        /// Label of the task that panicked.
        label: String,
        /// Best-effort rendering of the panic payload.
        message: String,
    },

    /// The task was cancelled before it finished (runtime shutdown or a
    /// dropped wait group).
    #[error("task '{label}' was cancelled")]
    Cancelled {
        /// Label of the cancelled task.
        label: String,
    },
}

impl TaskError {
    /// Returns the label of the failed task.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Panicked { label, .. } | Self::Cancelled { label } => label,
        }
    }
}

/// Renders a panic payload as text.
///
/// `panic!` payloads are either `&'static str` or `String`; anything else is
/// reported as opaque.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_str_and_string() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");

        let boxed: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_task_error_label() {
        let err = TaskError::Cancelled {
            label: "layer:root".to_string(),
        };
        assert_eq!(err.label(), "layer:root");
        assert_eq!(err.to_string(), "task 'layer:root' was cancelled");
    }
}
