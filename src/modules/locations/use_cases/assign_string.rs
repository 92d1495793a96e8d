// Manual assignment of an unassigned location string.
//
// The only path by which aliases are learned. The raw string becomes an alias of the chosen
// location and every event carrying it as an unresolved segment starts referencing the location.
// Re-assigning the same pair changes nothing.

use crate::modules::locations::core::normalize::{normalize, split_segments};
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::Actor;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub location_id: String,
    pub alias_added: bool,
    pub events_updated: usize,
}

impl LocationHandler {
    pub async fn assign_string(
        &self,
        actor: &Actor,
        raw: &str,
        location_id: &str,
    ) -> Result<AssignmentReport, ApplicationError> {
        Self::require_approver(actor, "assign location strings")?;
        let current = self.load_location(location_id).await?;
        if !current.record.is_active() {
            return Err(ApplicationError::conflict(
                format!("location {location_id} is {}", current.record.status),
                Some(current.record.status.as_str().to_string()),
            ));
        }
        let raw = raw.trim();
        let key = normalize(raw);
        if key.is_empty() {
            return Err(ApplicationError::Validation("location string is empty".into()));
        }
        if split_segments(raw).len() > 1 {
            return Err(ApplicationError::Validation(
                "assign each segment of a multi-location string separately".into(),
            ));
        }
        if let Some(owner) = self.index().await?.lookup(raw) {
            if owner != location_id {
                return Err(ApplicationError::conflict(
                    format!("\"{raw}\" already identifies location {owner}"),
                    None,
                ));
            }
        }

        let mut location = current.record;
        let alias_added = location.add_alias(raw);
        if alias_added {
            location.updated_at = self.clock.now();
            self.locations.save(location, current.version).await?;
        }

        let candidates: Vec<String> = self
            .active_events()
            .await?
            .into_iter()
            .filter(|event| {
                event
                    .unresolved_locations
                    .iter()
                    .any(|segment| normalize(segment) == key)
            })
            .map(|event| event.id)
            .collect();

        let mut events_updated = 0;
        let mut references_added: i64 = 0;
        for id in candidates {
            let rewritten = self
                .rewrite_event(&id, |event| {
                    if event.is_deleted {
                        return false;
                    }
                    let before = event.unresolved_locations.len();
                    event
                        .unresolved_locations
                        .retain(|segment| normalize(segment) != key);
                    if event.unresolved_locations.len() == before {
                        return false;
                    }
                    if !event.references_location(location_id) {
                        event.location_ids.push(location_id.to_string());
                    }
                    true
                })
                .await?;
            if let Some(before) = rewritten {
                events_updated += 1;
                if !before.references_location(location_id) {
                    references_added += 1;
                }
            }
        }
        if references_added > 0 {
            self.locations
                .adjust_usage(location_id, references_added)
                .await?;
        }

        info!(location_id, alias_added, events_updated, "location string assigned");
        Ok(AssignmentReport {
            location_id: location_id.to_string(),
            alias_added,
            events_updated,
        })
    }
}
