use crate::modules::events::core::state::EventRecord;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEvent {
    pub external_id: String,
    pub reason: String,
}

/// Outcome of reconciling one calendar over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalendarSyncReport {
    pub calendar_id: String,
    pub pages_fetched: usize,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: Vec<SkippedEvent>,
    /// Set when pagination stopped early. Records from earlier pages stay applied.
    pub fetch_error: Option<String>,
    pub records: Vec<EventRecord>,
}

impl CalendarSyncReport {
    pub fn new(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            ..Self::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fetch_error.is_none() && self.skipped.is_empty()
    }

    pub fn changed(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub calendars: Vec<CalendarSyncReport>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.calendars.iter().all(CalendarSyncReport::is_complete)
    }
}
