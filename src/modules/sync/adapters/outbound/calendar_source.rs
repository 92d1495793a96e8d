// Port for the external calendar service.
//
// Purpose
// - The system of record for scheduling. This crate mirrors and enriches it.
//
// Responsibilities
// - Paginated reads by calendar id and time window, single event reads for registration links.
// - Create/update/delete of the external event behind an approved reservation.
//
// Boundaries
// - Transport and authentication belong to the concrete adapter.

use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::TimeWindow;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// An event as the calendar service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub id: String,
    pub calendar_id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Link to the shadow event spanning setup and teardown.
    #[serde(default)]
    pub registration_event_id: Option<String>,
    /// Human event id stamped on events created from a local draft.
    #[serde(default)]
    pub internal_event_id: Option<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<ExternalEvent>,
    pub next_page_token: Option<String>,
}

/// What gets written to the calendar service when a reservation is approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub time_zone: Option<String>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub category: Option<String>,
    pub internal_event_id: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("calendar service unavailable: {0}")]
    Unavailable(String),

    #[error("calendar item not found: {0}")]
    NotFound(String),

    #[error("calendar service rejected the request: {0}")]
    Rejected(String),
}

impl From<CalendarError> for ApplicationError {
    fn from(error: CalendarError) -> Self {
        Self::External(error.to_string())
    }
}

#[async_trait::async_trait]
pub trait ExternalCalendar: Send + Sync {
    async fn list_events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventPage, CalendarError>;

    async fn get_event(
        &self,
        calendar_id: &str,
        external_id: &str,
    ) -> Result<ExternalEvent, CalendarError>;

    /// Returns the id the calendar service assigned.
    async fn create_event(
        &self,
        calendar_id: &str,
        event: &OutboundEvent,
    ) -> Result<String, CalendarError>;

    async fn update_event(
        &self,
        calendar_id: &str,
        external_id: &str,
        event: &OutboundEvent,
    ) -> Result<(), CalendarError>;

    async fn delete_event(&self, calendar_id: &str, external_id: &str)
    -> Result<(), CalendarError>;
}
