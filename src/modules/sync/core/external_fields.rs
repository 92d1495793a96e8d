// Field ownership between the calendar service and the local record.
//
// Purpose
// - Reduce an external event to the fields the calendar service owns and apply them to a record.
//
// Responsibilities
// - Title, times, time zone, raw location text, description, all-day flag, category and
//   extensions come from the calendar on every sync. Resolved location ids follow the text.
// - Setup/teardown minutes come from a linked registration event when there is one.
// - Status, history, edit requests, assignment and notes are never touched here.
//
// Boundaries
// - Pure. The reconciler decides when to fetch, resolve and save.

use crate::modules::events::core::state::{
    EventRecord, EventStatus, HistoryAction, StatusHistoryEntry,
};
use crate::modules::locations::core::resolver::Resolution;
use crate::modules::sync::adapters::outbound::calendar_source::ExternalEvent;
use crate::shared::core::primitives::{LocationId, human_event_id};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const SYNC_ACTOR: &str = "external-sync";

/// Setup and teardown derived from a registration event's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTimes {
    pub setup_minutes: u32,
    pub teardown_minutes: u32,
}

impl RegistrationTimes {
    /// A shadow starting after the main event or ending before it contributes zero.
    pub fn between(main: &ExternalEvent, shadow: &ExternalEvent) -> Self {
        let minutes =
            |delta: chrono::Duration| u32::try_from(delta.num_minutes().max(0)).unwrap_or(u32::MAX);
        Self {
            setup_minutes: minutes(main.start.signed_duration_since(shadow.start)),
            teardown_minutes: minutes(shadow.end.signed_duration_since(main.end)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncedFields {
    pub external_id: String,
    pub calendar_id: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub time_zone: Option<String>,
    pub is_all_day: bool,
    pub location_text: Option<String>,
    pub location_ids: Vec<LocationId>,
    pub unresolved_locations: Vec<String>,
    pub registration_event_id: Option<String>,
    pub registration: Option<RegistrationTimes>,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl SyncedFields {
    pub fn from_external(
        event: &ExternalEvent,
        resolution: Resolution,
        registration: Option<RegistrationTimes>,
    ) -> Self {
        let location_text = event
            .location
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        Self {
            external_id: event.id.clone(),
            calendar_id: event.calendar_id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            category: event.categories.first().cloned(),
            start: event.start.with_timezone(&Utc),
            end: event.end.with_timezone(&Utc),
            utc_offset_minutes: event.start.offset().local_minus_utc() / 60,
            time_zone: event.time_zone.clone(),
            is_all_day: event.is_all_day,
            location_text,
            location_ids: resolution.location_ids,
            unresolved_locations: resolution.unresolved,
            registration_event_id: event.registration_event_id.clone(),
            registration,
            extensions: event.extensions.clone(),
        }
    }

    /// Overwrites the calendar-owned fields of `record`. Returns whether anything changed.
    pub fn apply_to(&self, record: &mut EventRecord) -> bool {
        let before = record.clone();
        record.external_id = Some(self.external_id.clone());
        record.calendar_id = Some(self.calendar_id.clone());
        record.title = self.title.clone();
        record.description = self.description.clone();
        record.category = self.category.clone();
        record.start = self.start;
        record.end = self.end;
        record.utc_offset_minutes = self.utc_offset_minutes;
        record.time_zone = self.time_zone.clone();
        record.is_all_day = self.is_all_day;
        record.location_text = self.location_text.clone();
        record.location_ids = self.location_ids.clone();
        record.unresolved_locations = self.unresolved_locations.clone();
        record.extensions = self.extensions.clone();
        if self.registration_event_id.is_some() {
            record.enrichment.registration_event_id = self.registration_event_id.clone();
        }
        if let Some(times) = self.registration {
            record.enrichment.setup_minutes = times.setup_minutes;
            record.enrichment.teardown_minutes = times.teardown_minutes;
        }
        *record != before
    }

    /// A record for an event that exists only in the calendar service.
    pub fn into_imported(self, id: String, now: DateTime<Utc>) -> EventRecord {
        let mut record = EventRecord {
            event_id: human_event_id(&id, now),
            id,
            external_id: None,
            calendar_id: None,
            title: String::new(),
            description: String::new(),
            category: None,
            start: self.start,
            end: self.end,
            utc_offset_minutes: 0,
            time_zone: None,
            is_all_day: false,
            location_text: None,
            location_ids: Vec::new(),
            unresolved_locations: Vec::new(),
            status: EventStatus::Approved,
            is_deleted: false,
            previous_status: None,
            deleted_at: None,
            deleted_by: None,
            submitted_at: None,
            pending_edit_request: None,
            status_history: vec![StatusHistoryEntry {
                status: EventStatus::Approved,
                action: HistoryAction::Imported,
                changed_at: now,
                changed_by: SYNC_ACTOR.to_string(),
                changed_by_email: String::new(),
                reason: None,
            }],
            enrichment: Default::default(),
            extensions: BTreeMap::new(),
            created_by: SYNC_ACTOR.to_string(),
            created_by_email: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.apply_to(&mut record);
        record
    }
}
