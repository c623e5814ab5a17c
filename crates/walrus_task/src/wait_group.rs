//! Batch barrier returned by [`TaskEngine::submit_batch`](crate::TaskEngine::submit_batch).

use tokio::task::JoinSet;

use crate::error::TaskError;

/// Tracks the outstanding tasks of one submission batch.
///
/// Dropping a wait group without calling [`WaitGroup::wait`] cancels batch
/// tasks that have not started yet. Blocking bodies already running are
/// left to finish.
#[derive(Debug)]
pub struct WaitGroup {
    set: JoinSet<Result<(), TaskError>>,
}

impl WaitGroup {
    pub(crate) fn new(set: JoinSet<Result<(), TaskError>>) -> Self {
        Self { set }
    }

    /// Number of tasks not yet collected.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if the batch was empty or has been fully collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Suspend until every task in the batch has finished.
    ///
    /// Returns once the last task completed, whatever the completion order.
    pub async fn wait(mut self) -> WaitReport {
        let mut report = WaitReport::default();
        while let Some(joined) = self.set.join_next().await {
            match joined {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(err)) => report.failures.push(err),
                Err(err) => report.failures.push(TaskError::Cancelled {
                    label: format!("batch task {}", err.id()),
                }),
            }
        }
        report
    }
}

/// Summary of a finished batch.
#[derive(Debug, Default)]
pub struct WaitReport {
    /// Tasks that completed normally.
    pub completed: usize,
    /// Tasks that panicked or were cancelled.
    pub failures: Vec<TaskError>,
}

impl WaitReport {
    /// Returns `true` if no task failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total number of tasks in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Task, TaskEngine, TaskPriority};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_batch_returns_immediately() {
        let engine = TaskEngine::current().unwrap();
        let wg = engine.submit_batch(Vec::<Task>::new(), TaskPriority::Normal);
        assert!(wg.is_empty());
        let report = wg.wait().await;
        assert_eq!(report.total(), 0);
        assert!(report.is_clean());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pending_counts_batch() {
        let engine = TaskEngine::current().unwrap();
        let tasks = (0..5).map(|i| Task::blocking(format!("t{i}"), || {}));
        let wg = engine.submit_batch(tasks, TaskPriority::Normal);
        assert_eq!(wg.pending(), 5);
        let report = wg.wait().await;
        assert_eq!(report.completed, 5);
    }
}
