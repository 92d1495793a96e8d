// EventRecord is the canonical state of a reservation after folding lifecycle events.
//
// Purpose
// - Keep externally owned fields (title, times, location text, description) apart from
//   internally owned enrichment (setup/teardown, assignment, notes, registration link).
// - Encode lifecycle with explicit status, a denormalised `is_deleted` flag and an append-only
//   audit trail.
//
// Invariants
// - `is_deleted` iff `status == Deleted`.
// - `status_history` is non-empty and its last entry's status equals `status`.
// - `pending_edit_request` only exists while `status == Approved`.

use crate::shared::core::primitives::LocationId;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Deleted,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in a transition. The entry's `status` is the status it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Imported,
    Updated,
    Submitted,
    Approved,
    Rejected,
    Deleted,
    Restored,
    EditRequested,
    EditApproved,
    EditRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: EventStatus,
    pub action: HistoryAction,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub changed_by_email: String,
    pub reason: Option<String>,
}

/// Field changes proposed by an update or an edit request. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    pub location_ids: Option<Vec<LocationId>>,
    pub setup_minutes: Option<u32>,
    pub teardown_minutes: Option<u32>,
    pub assigned_to: Option<String>,
    pub internal_notes: Option<String>,
}

impl EventChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEditRequest {
    pub changes: EventChanges,
    pub reason: String,
    pub requested_by: String,
    pub requested_by_email: String,
    pub requested_at: DateTime<Utc>,
}

/// Internally owned fields. The external calendar never supplies these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub setup_minutes: u32,
    pub teardown_minutes: u32,
    pub assigned_to: Option<String>,
    pub internal_notes: Option<String>,
    pub registration_event_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub external_id: Option<String>,
    pub event_id: String,
    pub calendar_id: Option<String>,

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

    pub status: EventStatus,
    pub is_deleted: bool,
    pub previous_status: Option<EventStatus>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub pending_edit_request: Option<PendingEditRequest>,
    pub status_history: Vec<StatusHistoryEntry>,

    pub enrichment: Enrichment,
    /// Forward compatible bag for unknown external properties. Never mixed into core fields.
    pub extensions: BTreeMap<String, serde_json::Value>,

    pub created_by: String,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }

    pub fn local_start(&self) -> DateTime<FixedOffset> {
        self.start.with_timezone(&self.offset())
    }

    pub fn local_end(&self) -> DateTime<FixedOffset> {
        self.end.with_timezone(&self.offset())
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn references_location(&self, location_id: &str) -> bool {
        self.location_ids.iter().any(|id| id == location_id)
    }

    /// Checks the lifecycle invariants listed at the top of this file.
    pub fn is_consistent(&self) -> bool {
        let deleted_flag_matches = self.is_deleted == (self.status == EventStatus::Deleted);
        let history_matches = self
            .status_history
            .last()
            .is_some_and(|entry| entry.status == self.status);
        let edit_request_allowed =
            self.pending_edit_request.is_none() || self.status == EventStatus::Approved;
        deleted_flag_matches && history_matches && edit_request_allowed
    }
}
