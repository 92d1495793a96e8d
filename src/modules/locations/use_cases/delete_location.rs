// Location soft delete.
//
// The location is marked deleted first so nothing new resolves to it, then every referencing
// event loses that one reference. Progress is published per event. Running delete again on a
// deleted location sweeps whatever references remain.

use crate::modules::locations::core::location::LocationStatus;
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::Actor;
use crate::shared::infrastructure::progress::OperationState;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub location_id: String,
    pub events_updated: usize,
}

/// A delete whose location is already marked and whose progress entry is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    pub location_id: String,
    pub event_ids: Vec<String>,
}

impl LocationHandler {
    /// Registers the progress entry before anything is written, so a delete refused because
    /// another operation runs on the same location leaves the location untouched.
    pub async fn prepare_delete(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<DeletePlan, ApplicationError> {
        Self::require_admin(actor, "delete locations")?;
        let current = self.load_location(id).await?;
        if current.record.status == LocationStatus::Merged {
            return Err(ApplicationError::conflict(
                format!("location {id} was merged and cannot be deleted"),
                Some(LocationStatus::Merged.as_str().to_string()),
            ));
        }
        if let Err(running) = self.progress.start(id, "delete", 0, self.clock.now()).await {
            return Err(ApplicationError::conflict(
                format!("a {} of {id} is already running", running.operation),
                None,
            ));
        }
        match self.mark_deleted(actor, id).await {
            Ok(event_ids) => {
                self.progress.set_total(id, event_ids.len()).await;
                Ok(DeletePlan {
                    location_id: id.to_string(),
                    event_ids,
                })
            }
            Err(error) => {
                self.progress
                    .finish(id, OperationState::Failed(error.to_string()), self.clock.now())
                    .await;
                Err(error)
            }
        }
    }

    /// Marks the location deleted unless it already is. Returns the events still referencing it.
    async fn mark_deleted(&self, actor: &Actor, id: &str) -> Result<Vec<String>, ApplicationError> {
        let current = self.load_location(id).await?;
        match current.record.status {
            LocationStatus::Deleted => {}
            LocationStatus::Merged => {
                return Err(ApplicationError::conflict(
                    format!("location {id} was merged and cannot be deleted"),
                    Some(LocationStatus::Merged.as_str().to_string()),
                ));
            }
            LocationStatus::Pending | LocationStatus::Approved => {
                let now = self.clock.now();
                let mut location = current.record;
                location.status = LocationStatus::Deleted;
                location.deleted_by = Some(actor.user_id.clone());
                location.deleted_at = Some(now);
                location.updated_at = now;
                self.locations.save(location, current.version).await?;
            }
        }
        Ok(self.records.ids_referencing_location(id).await?)
    }

    pub async fn run_delete(
        &self,
        plan: DeletePlan,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, ApplicationError> {
        let location_id = plan.location_id.as_str();
        let total = plan.event_ids.len();
        let mut processed = 0;
        let mut events_updated = 0;
        let mut references_removed: i64 = 0;
        let mut failure: Option<ApplicationError> = None;

        for id in &plan.event_ids {
            if cancel.is_cancelled() {
                failure = Some(ApplicationError::Cancelled { processed, total });
                break;
            }
            let rewritten = self
                .rewrite_event(id, |event| {
                    let before = event.location_ids.len();
                    event.location_ids.retain(|kept| kept != location_id);
                    event.location_ids.len() != before
                })
                .await;
            match rewritten {
                Ok(Some(before)) => {
                    events_updated += 1;
                    if !before.is_deleted {
                        references_removed += 1;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
            processed += 1;
            self.progress.advance(location_id).await;
        }

        if references_removed > 0 {
            if let Err(error) = self
                .locations
                .adjust_usage(location_id, -references_removed)
                .await
            {
                warn!(location_id, error = %error, "usage count not adjusted");
            }
        }

        let now = self.clock.now();
        match failure {
            None => {
                self.progress
                    .finish(location_id, OperationState::Completed, now)
                    .await;
                info!(location_id, events_updated, "location deleted");
                Ok(DeleteOutcome {
                    location_id: location_id.to_string(),
                    events_updated,
                })
            }
            Some(error) => {
                let state = match &error {
                    ApplicationError::Cancelled { .. } => OperationState::Cancelled,
                    other => OperationState::Failed(other.to_string()),
                };
                self.progress.finish(location_id, state, now).await;
                Err(error)
            }
        }
    }

    pub async fn delete_location(
        &self,
        actor: &Actor,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, ApplicationError> {
        let plan = self.prepare_delete(actor, id).await?;
        self.run_delete(plan, cancel).await
    }

    /// Validates and marks the location, then rewrites events on a background task.
    /// Callers follow the work through `delete_progress`.
    pub async fn start_delete(
        self: Arc<Self>,
        actor: &Actor,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<usize, ApplicationError> {
        let plan = self.prepare_delete(actor, id).await?;
        let total = plan.event_ids.len();
        tokio::spawn(async move {
            let location_id = plan.location_id.clone();
            if let Err(failure) = self.run_delete(plan, &cancel).await {
                error!(location_id = %location_id, error = %failure, "background location delete stopped");
            }
        });
        Ok(total)
    }
}
