// Port for the Event Record Store.
//
// Purpose
// - Persist one EventRecord per internal id with an integer version.
//
// Responsibilities
// - `save` is the only mutation path and is conditional on the expected version.
// - Secondary lookups by external id and by human event id serve the reconciler.
//
// Boundaries
// - No knowledge of lifecycle rules or locations.

use crate::modules::events::core::state::{EventRecord, EventStatus};
use crate::shared::core::primitives::TimeWindow;
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub status: Option<EventStatus>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(skip)]
    pub window: Option<TimeWindow>,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, record: &EventRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
            && self.is_deleted.is_none_or(|flag| record.is_deleted == flag)
            && self
                .window
                .is_none_or(|window| window.intersects(record.start, record.end))
            && self
                .calendar_id
                .as_ref()
                .is_none_or(|calendar_id| record.calendar_id.as_ref() == Some(calendar_id))
            && self
                .location_id
                .as_ref()
                .is_none_or(|location_id| record.references_location(location_id))
            && self
                .created_by
                .as_ref()
                .is_none_or(|user_id| record.is_owned_by(user_id))
    }
}

#[async_trait::async_trait]
pub trait EventRecordStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Versioned<EventRecord>>, StoreError>;

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Versioned<EventRecord>>, StoreError>;

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<Versioned<EventRecord>>, StoreError>;

    /// Stores a new record at version 1. Fails with `Duplicate` when the id is taken.
    async fn insert(&self, record: EventRecord) -> Result<u64, StoreError>;

    /// Replaces the record when its stored version equals `expected_version`.
    /// Returns the new version.
    async fn save(&self, record: EventRecord, expected_version: u64) -> Result<u64, StoreError>;

    /// Records matching the filter, ordered by start.
    async fn list(&self, filter: &EventFilter) -> Result<Vec<Versioned<EventRecord>>, StoreError>;

    async fn ids_referencing_location(&self, location_id: &str) -> Result<Vec<String>, StoreError>;
}
