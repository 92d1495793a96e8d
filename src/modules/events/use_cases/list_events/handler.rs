use crate::modules::events::adapters::outbound::event_records::{EventFilter, EventRecordStore};
use crate::modules::events::core::state::EventRecord;
use crate::shared::core::errors::ApplicationError;
use std::sync::Arc;

pub struct EventQueries {
    records: Arc<dyn EventRecordStore>,
}

impl EventQueries {
    pub fn new(records: Arc<dyn EventRecordStore>) -> Self {
        Self { records }
    }

    pub async fn get(&self, id: &str) -> Result<EventRecord, ApplicationError> {
        self.records
            .load(id)
            .await?
            .map(|versioned| versioned.record)
            .ok_or_else(|| ApplicationError::NotFound(format!("event {id}")))
    }

    pub async fn list(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, ApplicationError> {
        Ok(self
            .records
            .list(filter)
            .await?
            .into_iter()
            .map(|versioned| versioned.record)
            .collect())
    }
}
