// Location Resolver.
//
// Purpose
// - Map raw location text to canonical location ids and keep the unmapped remainder.
//
// Responsibilities
// - Exact equality of normalized strings is the only automatic match.
// - Substring containment produces advisory suggestions only.
// - Each segment of a multi-location string resolves on its own.
//
// Boundaries
// - Pure. Built from a snapshot of locations; callers reload it when aliases change.

use crate::modules::events::core::state::EventRecord;
use crate::modules::locations::core::location::{Location, LocationStatus};
use crate::modules::locations::core::normalize::{normalize, split_segments};
use crate::shared::core::primitives::LocationId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub location_ids: Vec<LocationId>,
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub location_id: LocationId,
    pub location_name: String,
    pub matched_key: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnassignedLocationString {
    pub raw: String,
    pub normalized: String,
    pub event_count: usize,
    pub suggestions: Vec<Suggestion>,
}

/// Follows `merged_into` to an active location. Chains that loop or end elsewhere resolve to none.
fn merge_survivor<'a>(
    location: &'a Location,
    by_id: &HashMap<&str, &'a Location>,
) -> Option<&'a Location> {
    let mut current = location;
    for _ in 0..by_id.len() {
        let target = *by_id.get(current.merged_into.as_deref()?)?;
        if target.is_active() {
            return Some(target);
        }
        if target.status != LocationStatus::Merged {
            return None;
        }
        current = target;
    }
    None
}

#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    by_key: HashMap<String, LocationId>,
    keys: Vec<(String, LocationId, String)>,
}

impl LocationIndex {
    /// Indexes the active locations. When two locations share a key the first one wins.
    /// Keys of merged locations resolve to the active location their merge chain ends at, unless
    /// an active location claims the key itself. Merged locations are never suggested.
    pub fn build<'a>(locations: impl IntoIterator<Item = &'a Location>) -> Self {
        let locations: Vec<&Location> = locations.into_iter().collect();
        let mut index = Self::default();
        for location in locations.iter().filter(|l| l.is_active()) {
            for key in location.match_keys() {
                index
                    .by_key
                    .entry(key.clone())
                    .or_insert_with(|| location.id.clone());
                index
                    .keys
                    .push((key, location.id.clone(), location.name.clone()));
            }
        }
        let by_id: HashMap<&str, &Location> = locations.iter().map(|&l| (l.id.as_str(), l)).collect();
        for location in locations.iter().copied().filter(|l| l.status == LocationStatus::Merged) {
            let Some(survivor) = merge_survivor(location, &by_id) else {
                continue;
            };
            for key in location.match_keys() {
                index
                    .by_key
                    .entry(key)
                    .or_insert_with(|| survivor.id.clone());
            }
        }
        index
    }

    pub fn lookup(&self, segment: &str) -> Option<&LocationId> {
        self.by_key.get(&normalize(segment))
    }

    pub fn resolve(&self, raw: Option<&str>) -> Resolution {
        let mut resolution = Resolution::default();
        let Some(raw) = raw else {
            return resolution;
        };
        for segment in split_segments(raw) {
            match self.lookup(&segment) {
                Some(id) => {
                    if !resolution.location_ids.contains(id) {
                        resolution.location_ids.push(id.clone());
                    }
                }
                None => resolution.unresolved.push(segment),
            }
        }
        resolution
    }

    /// Candidates whose key contains, or is contained in, the normalized segment.
    /// Confidence is the length of the shorter key over the longer one. Never auto-applied.
    pub fn suggest(&self, segment: &str, limit: usize) -> Vec<Suggestion> {
        let needle = normalize(segment);
        if needle.is_empty() {
            return Vec::new();
        }
        let mut best: HashMap<&str, Suggestion> = HashMap::new();
        for (key, id, name) in &self.keys {
            if !(key.contains(&needle) || needle.contains(key.as_str())) {
                continue;
            }
            let (short, long) = if key.len() < needle.len() {
                (key.len(), needle.len())
            } else {
                (needle.len(), key.len())
            };
            let confidence = short as f64 / long as f64;
            let candidate = Suggestion {
                location_id: id.clone(),
                location_name: name.clone(),
                matched_key: key.clone(),
                confidence,
            };
            best.entry(id.as_str())
                .and_modify(|current| {
                    if candidate.confidence > current.confidence {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        }
        let mut suggestions: Vec<Suggestion> = best.into_values().collect();
        suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.location_id.cmp(&b.location_id))
        });
        suggestions.truncate(limit);
        suggestions
    }

    /// Aggregates unresolved segments of non-deleted events by normalized form.
    /// The first raw spelling seen is reported. Sorted by event count, most frequent first.
    pub fn unassigned<'a>(
        &self,
        events: impl IntoIterator<Item = &'a EventRecord>,
        suggestion_limit: usize,
    ) -> Vec<UnassignedLocationString> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (String, usize)> = HashMap::new();
        for event in events.into_iter().filter(|e| !e.is_deleted) {
            let mut seen_in_event: Vec<String> = Vec::new();
            for raw in &event.unresolved_locations {
                let normalized = normalize(raw);
                if normalized.is_empty()
                    || self.by_key.contains_key(&normalized)
                    || seen_in_event.contains(&normalized)
                {
                    continue;
                }
                seen_in_event.push(normalized.clone());
                let entry = groups.entry(normalized.clone()).or_insert_with(|| {
                    order.push(normalized.clone());
                    (raw.clone(), 0)
                });
                entry.1 += 1;
            }
        }
        let mut aggregated: Vec<UnassignedLocationString> = order
            .into_iter()
            .filter_map(|normalized| {
                let (raw, event_count) = groups.remove(&normalized)?;
                Some(UnassignedLocationString {
                    suggestions: self.suggest(&raw, suggestion_limit),
                    raw,
                    normalized,
                    event_count,
                })
            })
            .collect();
        aggregated.sort_by(|a, b| b.event_count.cmp(&a.event_count));
        aggregated
    }
}
