//! Stage 4: submit alarms to the backend.

use super::Stage;
use crate::errors::StageError;
use crate::fanout::{ConcurrencyLimit, TaskGroup};
use crate::model::Alarm;
use crate::ports::AlarmStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Outcome counts for one persisted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Alarms submitted.
    pub submitted: usize,
    /// Alarms the backend accepted.
    pub stored: usize,
    /// Alarms that failed.
    pub failed: usize,
}

/// Stores every alarm and passes the batch through unchanged.
pub struct AlarmPersister {
    store: Arc<dyn AlarmStore>,
    limit: ConcurrencyLimit,
}

impl AlarmPersister {
    /// Creates a persister running at most `permits` submissions at once.
    #[must_use]
    pub fn new(store: Arc<dyn AlarmStore>, permits: usize) -> Self {
        Self {
            store,
            limit: ConcurrencyLimit::new(permits),
        }
    }

    /// Submits every alarm. A failure is logged and does not affect the others.
    pub async fn persist(&self, alarms: &[Alarm]) -> PersistReport {
        let mut group = TaskGroup::new("persister");

        for alarm in alarms.iter().cloned() {
            let store = self.store.clone();
            group.spawn(&self.limit, async move {
                match store.create_alarm(&alarm).await {
                    Ok(()) => true,
                    Err(e) => {
                        let payload = serde_json::to_string(&alarm).unwrap_or_default();
                        tracing::error!(
                            device_id = %alarm.device_id,
                            alarm = %payload,
                            error = %e,
                            "Failed to persist alarm"
                        );
                        false
                    }
                }
            });
        }

        let outcomes = group.join().await;
        let stored = outcomes.iter().filter(|ok| **ok).count();
        let report = PersistReport {
            submitted: alarms.len(),
            stored,
            failed: alarms.len() - stored,
        };
        tracing::info!(
            submitted = report.submitted,
            stored = report.stored,
            failed = report.failed,
            "Persisted alarm batch"
        );
        report
    }
}

impl std::fmt::Debug for AlarmPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmPersister")
            .field("permits", &self.limit.permits())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for AlarmPersister {
    type Input = Vec<Alarm>;
    type Output = Vec<Alarm>;

    fn name(&self) -> &'static str {
        "persister"
    }

    async fn execute(&self, alarms: Vec<Alarm>) -> Result<Vec<Alarm>, StageError> {
        self.persist(&alarms).await;
        Ok(alarms)
    }
}
