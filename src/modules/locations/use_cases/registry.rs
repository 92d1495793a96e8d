use crate::modules::locations::core::location::{Location, LocationAttributes, LocationStatus};
use crate::modules::locations::core::normalize::normalize;
use crate::modules::locations::core::resolver::{Suggestion, UnassignedLocationString};
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::{Actor, new_id};
use crate::shared::infrastructure::progress::OperationProgress;
use serde::{Deserialize, Serialize};
use tracing::info;

const SUGGESTION_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateLocation {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub attributes: LocationAttributes,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateLocation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Option<LocationAttributes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationEventCount {
    pub location_id: String,
    pub usage_count: u64,
    pub event_count: usize,
}

impl LocationHandler {
    /// Fails with a Conflict when `raw` already names an active location other than `except`.
    async fn ensure_unclaimed(&self, raw: &str, except: Option<&str>) -> Result<(), ApplicationError> {
        let key = normalize(raw);
        if key.is_empty() {
            return Ok(());
        }
        for other in self.locations.list().await? {
            let other = other.record;
            if Some(other.id.as_str()) == except || !other.is_active() {
                continue;
            }
            if other.match_keys().contains(&key) {
                return Err(ApplicationError::conflict(
                    format!("\"{raw}\" already identifies location {}", other.id),
                    Some(other.status.as_str().to_string()),
                ));
            }
        }
        Ok(())
    }

    pub async fn get_location(&self, id: &str) -> Result<Location, ApplicationError> {
        Ok(self.load_location(id).await?.record)
    }

    pub async fn list_locations(
        &self,
        status: Option<LocationStatus>,
    ) -> Result<Vec<Location>, ApplicationError> {
        Ok(self
            .locations
            .list()
            .await?
            .into_iter()
            .map(|v| v.record)
            .filter(|location| status.is_none_or(|status| location.status == status))
            .collect())
    }

    pub async fn list_pending(&self) -> Result<Vec<Location>, ApplicationError> {
        self.list_locations(Some(LocationStatus::Pending)).await
    }

    pub async fn create_location(
        &self,
        actor: &Actor,
        command: CreateLocation,
    ) -> Result<Location, ApplicationError> {
        Self::require_approver(actor, "create locations")?;
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(ApplicationError::Validation("location name is required".into()));
        }
        self.ensure_unclaimed(&name, None).await?;
        let mut location = Location::new(
            new_id(),
            name,
            command.attributes,
            actor.user_id.clone(),
            self.clock.now(),
        );
        for alias in &command.aliases {
            self.ensure_unclaimed(alias, None).await?;
            location.add_alias(alias);
        }
        self.locations.insert(location.clone()).await?;
        info!(location_id = %location.id, name = %location.name, "location created");
        Ok(location)
    }

    pub async fn update_location(
        &self,
        actor: &Actor,
        id: &str,
        command: UpdateLocation,
    ) -> Result<Location, ApplicationError> {
        Self::require_approver(actor, "update locations")?;
        let current = self.load_location(id).await?;
        let mut location = current.record;
        if !location.is_active() {
            return Err(ApplicationError::conflict(
                format!("location {id} is {}", location.status),
                Some(location.status.as_str().to_string()),
            ));
        }
        if let Some(name) = command.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ApplicationError::Validation("location name is required".into()));
            }
            self.ensure_unclaimed(&name, Some(id)).await?;
            location.name = name;
        }
        if let Some(attributes) = command.attributes {
            location.attributes = attributes;
        }
        location.updated_at = self.clock.now();
        self.locations.save(location.clone(), current.version).await?;
        Ok(location)
    }

    /// Moves a pending location to approved. Approving an approved location is a no-op.
    pub async fn approve_location(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<Location, ApplicationError> {
        Self::require_approver(actor, "approve locations")?;
        let current = self.load_location(id).await?;
        let mut location = current.record;
        match location.status {
            LocationStatus::Approved => return Ok(location),
            LocationStatus::Pending => {}
            other => {
                return Err(ApplicationError::conflict(
                    format!("location {id} is {other}"),
                    Some(other.as_str().to_string()),
                ));
            }
        }
        let now = self.clock.now();
        location.status = LocationStatus::Approved;
        location.approved_by = Some(actor.user_id.clone());
        location.approved_at = Some(now);
        location.review_notes = notes.filter(|notes| !notes.trim().is_empty());
        location.updated_at = now;
        self.locations.save(location.clone(), current.version).await?;
        info!(location_id = %id, "location approved");
        Ok(location)
    }

    /// Replaces the alias list. Aliases that normalize to the name or to each other collapse.
    pub async fn update_aliases(
        &self,
        actor: &Actor,
        id: &str,
        aliases: Vec<String>,
    ) -> Result<Location, ApplicationError> {
        Self::require_approver(actor, "edit aliases")?;
        let current = self.load_location(id).await?;
        let mut location = current.record;
        if !location.is_active() {
            return Err(ApplicationError::conflict(
                format!("location {id} is {}", location.status),
                Some(location.status.as_str().to_string()),
            ));
        }
        location.aliases.clear();
        for alias in &aliases {
            self.ensure_unclaimed(alias, Some(id)).await?;
            location.add_alias(alias);
        }
        location.updated_at = self.clock.now();
        self.locations.save(location.clone(), current.version).await?;
        Ok(location)
    }

    /// Advisory only. Nothing is assigned.
    pub async fn suggest(&self, raw: &str) -> Result<Vec<Suggestion>, ApplicationError> {
        Ok(self.index().await?.suggest(raw, SUGGESTION_LIMIT))
    }

    pub async fn list_unassigned(&self) -> Result<Vec<UnassignedLocationString>, ApplicationError> {
        let index = self.index().await?;
        let events = self.active_events().await?;
        Ok(index.unassigned(&events, SUGGESTION_LIMIT))
    }

    pub async fn event_count(&self, id: &str) -> Result<LocationEventCount, ApplicationError> {
        let location = self.load_location(id).await?.record;
        let events = self.active_events().await?;
        Ok(LocationEventCount {
            event_count: events
                .iter()
                .filter(|event| event.references_location(id))
                .count(),
            location_id: location.id,
            usage_count: location.usage_count,
        })
    }

    pub async fn delete_progress(&self, id: &str) -> Result<OperationProgress, ApplicationError> {
        self.progress
            .get(id)
            .await
            .ok_or_else(|| ApplicationError::NotFound(format!("no operation recorded for {id}")))
    }
}
