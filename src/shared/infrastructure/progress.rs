// Transient progress for long running bulk rewrites (location merge and delete).
//
// Purpose
// - Let callers poll `processed / total` without blocking the request that started the work.
//
// Responsibilities
// - Keyed by the operation target (a location id). Lives in memory only; the final state stays
//   readable until the next operation on the same key replaces it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum OperationState {
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationProgress {
    pub operation: String,
    pub processed: usize,
    pub total: usize,
    #[serde(flatten)]
    pub state: OperationState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OperationProgress {
    pub fn is_running(&self) -> bool {
        self.state == OperationState::Running
    }
}

#[derive(Default)]
pub struct ProgressRegistry {
    inner: RwLock<HashMap<String, OperationProgress>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new run for `key`. Fails when a run for the same key is still in progress.
    pub async fn start(
        &self,
        key: &str,
        operation: &str,
        total: usize,
        at: DateTime<Utc>,
    ) -> Result<(), OperationProgress> {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.get(key) {
            if existing.is_running() {
                return Err(existing.clone());
            }
        }
        guard.insert(
            key.to_string(),
            OperationProgress {
                operation: operation.to_string(),
                processed: 0,
                total,
                state: OperationState::Running,
                started_at: at,
                finished_at: None,
            },
        );
        Ok(())
    }

    /// Sets the total of a run registered before its work was counted.
    pub async fn set_total(&self, key: &str, total: usize) {
        if let Some(progress) = self.inner.write().await.get_mut(key) {
            progress.total = total;
            progress.processed = progress.processed.min(total);
        }
    }

    pub async fn advance(&self, key: &str) {
        if let Some(progress) = self.inner.write().await.get_mut(key) {
            progress.processed = (progress.processed + 1).min(progress.total);
        }
    }

    pub async fn finish(&self, key: &str, state: OperationState, at: DateTime<Utc>) {
        if let Some(progress) = self.inner.write().await.get_mut(key) {
            progress.state = state;
            progress.finished_at = Some(at);
        }
    }

    pub async fn get(&self, key: &str) -> Option<OperationProgress> {
        self.inner.read().await.get(key).cloned()
    }
}

#[cfg(test)]
mod progress_registry_tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_track_processed_items_up_to_the_total(now: DateTime<Utc>) {
        let registry = ProgressRegistry::new();
        registry.start("loc-1", "delete", 2, now).await.unwrap();
        registry.advance("loc-1").await;
        registry.advance("loc-1").await;
        registry.advance("loc-1").await;
        let progress = registry.get("loc-1").await.unwrap();
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.total, 2);
        assert!(progress.is_running());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_a_second_run_while_one_is_in_progress(now: DateTime<Utc>) {
        let registry = ProgressRegistry::new();
        registry.start("loc-1", "merge", 5, now).await.unwrap();
        let refused = registry.start("loc-1", "delete", 1, now).await;
        assert_eq!(refused.unwrap_err().operation, "merge");

        registry.finish("loc-1", OperationState::Completed, now).await;
        assert!(registry.start("loc-1", "delete", 1, now).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_the_final_state_readable(now: DateTime<Utc>) {
        let registry = ProgressRegistry::new();
        registry.start("loc-1", "delete", 3, now).await.unwrap();
        registry.advance("loc-1").await;
        registry.finish("loc-1", OperationState::Cancelled, now).await;
        let progress = registry.get("loc-1").await.unwrap();
        assert_eq!(progress.state, OperationState::Cancelled);
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.finished_at, Some(now));
        assert!(registry.get("loc-2").await.is_none());
    }
}
