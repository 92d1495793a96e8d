// Canonical location record.
//
// Invariants
// - Only `pending` and `approved` locations take part in matching and selection.
// - `merged` locations carry merged_into/by/at, `deleted` ones deleted_by/at. Both are kept for audit.
// - `usage_count` tracks the non-deleted events referencing the location.

use crate::modules::locations::core::normalize::normalize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Pending,
    Approved,
    Merged,
    Deleted,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Merged => "merged",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive attributes editable through create/update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationAttributes {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub location_code: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub accessibility: Vec<String>,
    #[serde(default)]
    pub is_reservable: bool,
    #[serde(default)]
    pub parent_location_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub attributes: LocationAttributes,
    pub aliases: Vec<String>,
    pub usage_count: u64,
    pub status: LocationStatus,

    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub merged_into: Option<String>,
    pub merged_by: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn new(
        id: String,
        name: String,
        attributes: LocationAttributes,
        created_by: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            attributes,
            aliases: Vec::new(),
            usage_count: 0,
            status: LocationStatus::Pending,
            approved_by: None,
            approved_at: None,
            review_notes: None,
            merged_into: None,
            merged_by: None,
            merged_at: None,
            deleted_by: None,
            deleted_at: None,
            created_by,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, LocationStatus::Pending | LocationStatus::Approved)
    }

    /// Normalized name followed by normalized aliases, empty keys dropped.
    pub fn match_keys(&self) -> Vec<String> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|value| normalize(value))
            .filter(|key| !key.is_empty())
            .collect()
    }

    pub fn answers_to(&self, raw: &str) -> bool {
        let key = normalize(raw);
        !key.is_empty() && self.match_keys().contains(&key)
    }

    /// Adds `raw` as an alias unless the location already answers to it. Returns whether it was added.
    pub fn add_alias(&mut self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.answers_to(trimmed) {
            return false;
        }
        self.aliases.push(trimmed.to_string());
        true
    }
}
