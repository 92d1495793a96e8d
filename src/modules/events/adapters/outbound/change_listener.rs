// Notification seam for committed event writes.
//
// The lifecycle handler, the location use cases and the reconciler report which records they
// changed. The snapshot cache listens so the next read of an affected window is forced fresh.

use crate::modules::events::core::state::EventRecord;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedEvent {
    pub id: String,
    pub calendar_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&EventRecord> for ChangedEvent {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id.clone(),
            calendar_id: record.calendar_id.clone(),
            start: record.start,
            end: record.end,
        }
    }
}

#[async_trait::async_trait]
pub trait EventChangeListener: Send + Sync {
    async fn events_changed(&self, changes: &[ChangedEvent]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

#[async_trait::async_trait]
impl EventChangeListener for NoopListener {
    async fn events_changed(&self, _changes: &[ChangedEvent]) {}
}
