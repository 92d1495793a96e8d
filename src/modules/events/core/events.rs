// Lifecycle events produced by the deciders and folded by `evolve`.
//
// Each variant is one atomic transition: field changes plus exactly one audit entry.

use crate::modules::events::core::state::{EventChanges, EventStatus, PendingEditRequest};
use crate::shared::core::primitives::{Actor, LocationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who did it and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub at: DateTime<Utc>,
    pub by: String,
    pub by_email: String,
}

impl Stamp {
    pub fn new(actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            at,
            by: actor.user_id.clone(),
            by_email: actor.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCreated {
    pub id: String,
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
    pub location_ids: Vec<LocationId>,
    pub setup_minutes: u32,
    pub teardown_minutes: u32,
    pub internal_notes: Option<String>,
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    DraftCreated(DraftCreated),
    DraftUpdated {
        changes: EventChanges,
        stamp: Stamp,
    },
    Submitted {
        stamp: Stamp,
    },
    Approved {
        external_id: String,
        calendar_id: String,
        stamp: Stamp,
    },
    Rejected {
        reason: String,
        stamp: Stamp,
    },
    Deleted {
        previous_status: EventStatus,
        reason: Option<String>,
        stamp: Stamp,
    },
    Restored {
        restored_to: EventStatus,
        stamp: Stamp,
    },
    EditRequested {
        request: PendingEditRequest,
    },
    EditApproved {
        changes: EventChanges,
        stamp: Stamp,
    },
    EditRejected {
        reason: String,
        stamp: Stamp,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DraftCreated(_) => "draft_created",
            Self::DraftUpdated { .. } => "draft_updated",
            Self::Submitted { .. } => "submitted",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
            Self::Deleted { .. } => "deleted",
            Self::Restored { .. } => "restored",
            Self::EditRequested { .. } => "edit_requested",
            Self::EditApproved { .. } => "edit_approved",
            Self::EditRejected { .. } => "edit_rejected",
        }
    }
}
