//! Bounded fan-out of per-item tasks.
//!
//! Every stage spawns one task per item and waits for all of them before
//! handing its batch on. [`ConcurrencyLimit`] caps how many run at once;
//! [`TaskGroup`] owns the handles and collects the results.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A shared ceiling on concurrently running tasks.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

impl ConcurrencyLimit {
    /// Creates a limit allowing `permits` concurrent tasks (at least one).
    #[must_use]
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    /// Returns the configured ceiling.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Returns the number of permits not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A group of spawned tasks whose results are gathered together.
pub struct TaskGroup<T> {
    name: String,
    handles: Vec<JoinHandle<Option<T>>>,
}

impl<T: Send + 'static> TaskGroup<T> {
    /// Creates an empty group. The name is used in logs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handles: Vec::new(),
        }
    }

    /// Spawns a task that runs once a permit from `limit` is available.
    pub fn spawn<Fut>(&mut self, limit: &ConcurrencyLimit, task: Fut)
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let semaphore = limit.semaphore.clone();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquire only fails if it was.
            let _permit = semaphore.acquire_owned().await.ok()?;
            Some(task.await)
        });
        self.handles.push(handle);
    }

    /// Returns the number of spawned tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no task was spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every task and returns the results of those that finished.
    ///
    /// Panicked tasks are logged and contribute nothing.
    pub async fn join(self) -> Vec<T> {
        let mut results = Vec::with_capacity(self.handles.len());

        for handle in self.handles {
            match handle.await {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {
                    tracing::warn!(group = %self.name, "Task skipped: concurrency limit closed");
                }
                Err(join_error) => {
                    tracing::error!(group = %self.name, error = %join_error, "Task join error");
                }
            }
        }

        results
    }
}

impl<T> std::fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("name", &self.name)
            .field("task_count", &self.handles.len())
            .finish()
    }
}
