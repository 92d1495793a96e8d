use crate::modules::events::core::state::EventChanges;
use crate::shared::core::primitives::LocationId;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub location_ids: Vec<LocationId>,
    #[serde(default)]
    pub setup_minutes: u32,
    #[serde(default)]
    pub teardown_minutes: u32,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateDraft {
    #[serde(flatten)]
    pub changes: EventChanges,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteEvent {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RejectEvent {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestEdit {
    pub changes: EventChanges,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RejectEdit {
    #[serde(default)]
    pub reason: String,
}
