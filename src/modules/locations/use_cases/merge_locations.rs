// Location merge (source into target).
//
// Responsibilities
// - Every event referencing the source references the target instead, without duplicates.
// - Optionally the source's name and aliases become aliases of the target.
// - The target gains one usage per event that did not already reference it. The source keeps its
//   count for audit and ends up `merged`.
// - Several sources run as independent pairwise merges. A failure does not undo earlier ones and
//   every source gets its own result.

use crate::modules::locations::core::location::LocationStatus;
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::Actor;
use crate::shared::infrastructure::progress::OperationState;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeLocations {
    pub source_ids: Vec<String>,
    pub target_id: String,
    #[serde(default)]
    pub merge_aliases: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub events_rewritten: usize,
    pub usage_transferred: u64,
    pub aliases_added: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MergeItemResult {
    Merged {
        source_id: String,
        #[serde(flatten)]
        outcome: MergeOutcome,
    },
    Failed {
        source_id: String,
        error: String,
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub target_id: String,
    pub results: Vec<MergeItemResult>,
}

impl MergeSummary {
    pub fn all_merged(&self) -> bool {
        self.results
            .iter()
            .all(|result| matches!(result, MergeItemResult::Merged { .. }))
    }
}

impl LocationHandler {
    pub async fn merge_locations(
        &self,
        actor: &Actor,
        command: MergeLocations,
        cancel: &CancellationToken,
    ) -> Result<MergeSummary, ApplicationError> {
        Self::require_admin(actor, "merge locations")?;
        if command.source_ids.is_empty() {
            return Err(ApplicationError::Validation("no source locations given".into()));
        }
        let mut results = Vec::with_capacity(command.source_ids.len());
        for source_id in &command.source_ids {
            let result = if cancel.is_cancelled() {
                Err(ApplicationError::Cancelled {
                    processed: 0,
                    total: 0,
                })
            } else {
                self.merge_one(
                    actor,
                    source_id,
                    &command.target_id,
                    command.merge_aliases,
                    cancel,
                )
                .await
            };
            results.push(match result {
                Ok(outcome) => MergeItemResult::Merged {
                    source_id: source_id.clone(),
                    outcome,
                },
                Err(error) => {
                    warn!(source_id = %source_id, target_id = %command.target_id, error = %error, "merge failed");
                    MergeItemResult::Failed {
                        source_id: source_id.clone(),
                        kind: error.kind().to_string(),
                        error: error.to_string(),
                    }
                }
            });
        }
        Ok(MergeSummary {
            target_id: command.target_id,
            results,
        })
    }

    pub async fn merge_one(
        &self,
        actor: &Actor,
        source_id: &str,
        target_id: &str,
        merge_aliases: bool,
        cancel: &CancellationToken,
    ) -> Result<MergeOutcome, ApplicationError> {
        Self::require_admin(actor, "merge locations")?;
        if source_id == target_id {
            return Err(ApplicationError::Validation(
                "a location cannot be merged into itself".into(),
            ));
        }
        let source = self.load_location(source_id).await?;
        let target = self.load_location(target_id).await?;
        for side in [&source.record, &target.record] {
            if side.status != LocationStatus::Approved {
                return Err(ApplicationError::conflict(
                    format!("location {} is {}, only approved locations merge", side.id, side.status),
                    Some(side.status.as_str().to_string()),
                ));
            }
        }

        let referencing = self.records.ids_referencing_location(source_id).await?;
        let total = referencing.len();
        let now = self.clock.now();
        if let Err(running) = self.progress.start(source_id, "merge", total, now).await {
            return Err(ApplicationError::conflict(
                format!("a {} of {source_id} is already running", running.operation),
                None,
            ));
        }

        let mut processed = 0;
        let mut added_to_target: u64 = 0;
        for id in &referencing {
            if cancel.is_cancelled() {
                self.finish_merge(source_id, target_id, added_to_target, OperationState::Cancelled)
                    .await;
                return Err(ApplicationError::Cancelled { processed, total });
            }
            let rewritten = self
                .rewrite_event(id, |event| {
                    if !event.references_location(source_id) {
                        return false;
                    }
                    let mut ids: Vec<String> = Vec::with_capacity(event.location_ids.len());
                    for location_id in &event.location_ids {
                        let mapped = if location_id == source_id {
                            target_id
                        } else {
                            location_id.as_str()
                        };
                        if !ids.iter().any(|kept| kept == mapped) {
                            ids.push(mapped.to_string());
                        }
                    }
                    event.location_ids = ids;
                    true
                })
                .await;
            let rewritten = match rewritten {
                Ok(rewritten) => rewritten,
                Err(error) => {
                    self.finish_merge(
                        source_id,
                        target_id,
                        added_to_target,
                        OperationState::Failed(error.to_string()),
                    )
                    .await;
                    return Err(error);
                }
            };
            if let Some(before) = rewritten {
                if !before.is_deleted && !before.references_location(target_id) {
                    added_to_target += 1;
                }
            }
            processed += 1;
            self.progress.advance(source_id).await;
        }

        let aliases_added = if merge_aliases {
            self.copy_aliases(source_id, target_id).await?
        } else {
            0
        };

        let source = self.load_location(source_id).await?;
        let mut merged = source.record;
        merged.status = LocationStatus::Merged;
        merged.merged_into = Some(target_id.to_string());
        merged.merged_by = Some(actor.user_id.clone());
        merged.merged_at = Some(now);
        merged.updated_at = now;
        self.locations.save(merged, source.version).await?;

        self.finish_merge(source_id, target_id, added_to_target, OperationState::Completed)
            .await;
        info!(
            source_id,
            target_id,
            events_rewritten = processed,
            usage_transferred = added_to_target,
            "locations merged"
        );
        Ok(MergeOutcome {
            events_rewritten: processed,
            usage_transferred: added_to_target,
            aliases_added,
        })
    }

    /// Source name and aliases become target aliases. Returns how many were new.
    async fn copy_aliases(&self, source_id: &str, target_id: &str) -> Result<usize, ApplicationError> {
        let source = self.load_location(source_id).await?.record;
        let target = self.load_location(target_id).await?;
        let mut updated = target.record;
        let mut added = 0;
        for alias in std::iter::once(&source.name).chain(source.aliases.iter()) {
            if updated.add_alias(alias) {
                added += 1;
            }
        }
        if added > 0 {
            updated.updated_at = self.clock.now();
            self.locations.save(updated, target.version).await?;
        }
        Ok(added)
    }

    /// Usage moves for the references already rewritten, whatever the final state.
    async fn finish_merge(
        &self,
        source_id: &str,
        target_id: &str,
        added_to_target: u64,
        state: OperationState,
    ) {
        if added_to_target > 0 {
            let delta = i64::try_from(added_to_target).unwrap_or(i64::MAX);
            if let Err(error) = self.locations.adjust_usage(target_id, delta).await {
                warn!(target_id, error = %error, "target usage count not adjusted");
            }
        }
        self.progress.finish(source_id, state, self.clock.now()).await;
    }
}
