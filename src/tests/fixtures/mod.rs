// Builders and wiring shared by unit and e2e tests.
//
// Defaults describe one ordinary reservation in early March 2024 in the "primary" calendar,
// owned by `requester()`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::request::Builder;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use crate::modules::events::adapters::outbound::change_listener::NoopListener;
use crate::modules::events::adapters::outbound::event_records::EventRecordStore;
use crate::modules::events::adapters::outbound::event_records_in_memory::InMemoryEventRecords;
use crate::modules::events::core::events::{DraftCreated, LifecycleEvent, Stamp};
use crate::modules::events::core::evolve::evolve;
use crate::modules::events::core::state::{EventRecord, EventStatus};
use crate::modules::events::use_cases::lifecycle::commands::CreateDraft;
use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::adapters::outbound::location_store_in_memory::InMemoryLocationStore;
use crate::modules::locations::core::location::{Location, LocationAttributes, LocationStatus};
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::modules::sync::adapters::outbound::calendar_source::ExternalEvent;
use crate::shared::core::primitives::{Actor, ManualClock, Role, TimeWindow};
use crate::shared::infrastructure::progress::ProgressRegistry;
use crate::shared::infrastructure::retry::RetryPolicy;
use crate::shell::config::AppConfig;
use crate::shell::identity::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_ROLES_HEADER};
use crate::shell::state::{Adapters, AppState};

pub fn requester() -> Actor {
    Actor::new("user-1", "user-1@example.org", vec![Role::Requester])
}

pub fn other_requester() -> Actor {
    Actor::new("user-2", "user-2@example.org", vec![Role::Requester])
}

pub fn approver() -> Actor {
    Actor::new("approver-1", "approver-1@example.org", vec![Role::Approver])
}

pub fn admin() -> Actor {
    Actor::new("admin-1", "admin-1@example.org", vec![Role::Admin])
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

pub fn march_window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

pub fn stamp(by: &str) -> Stamp {
    Stamp {
        at: t0(),
        by: by.to_string(),
        by_email: format!("{by}@example.org"),
    }
}

fn eastern() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

pub fn draft_created() -> DraftCreated {
    DraftCreated {
        id: "ev-1".into(),
        event_id: "EVT-20240301-000000e1".into(),
        calendar_id: Some("primary".into()),
        title: "Choir practice".into(),
        description: String::new(),
        category: None,
        start: Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap(),
        utc_offset_minutes: -300,
        time_zone: Some("America/New_York".into()),
        is_all_day: false,
        location_ids: Vec::new(),
        setup_minutes: 0,
        teardown_minutes: 0,
        internal_notes: None,
        stamp: Stamp::new(&requester(), t0()),
    }
}

pub fn create_draft_command() -> CreateDraft {
    CreateDraft {
        title: "Choir practice".into(),
        description: "Weekly rehearsal".into(),
        category: Some("Music".into()),
        start: Some(Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2024, 3, 5, 20, 0, 0).unwrap()),
        utc_offset_minutes: -300,
        time_zone: Some("America/New_York".into()),
        is_all_day: false,
        location_ids: Vec::new(),
        setup_minutes: 0,
        teardown_minutes: 0,
        internal_notes: None,
        calendar_id: None,
    }
}

/// Builds records by folding the same lifecycle events the deciders emit.
pub struct EventRecordBuilder {
    id: String,
    event_id: Option<String>,
    external_id: Option<String>,
    status: EventStatus,
    deleted: bool,
    location_ids: Vec<String>,
    unresolved: Vec<String>,
    start: DateTime<Utc>,
}

impl Default for EventRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecordBuilder {
    pub fn new() -> Self {
        Self {
            id: "ev-1".into(),
            event_id: None,
            external_id: None,
            status: EventStatus::Draft,
            deleted: false,
            location_ids: Vec::new(),
            unresolved: Vec::new(),
            start: Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap(),
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn external_id(mut self, external_id: &str) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Soft deletes the record after moving it to `previous`.
    pub fn deleted_from(mut self, previous: EventStatus) -> Self {
        self.status = previous;
        self.deleted = true;
        self
    }

    pub fn location_ids(mut self, ids: &[&str]) -> Self {
        self.location_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn unresolved(mut self, raw: &[&str]) -> Self {
        self.unresolved = raw.iter().map(|value| value.to_string()).collect();
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn build(self) -> EventRecord {
        let event_id = self
            .event_id
            .unwrap_or_else(|| format!("EVT-20240301-{}", self.id));
        let created = DraftCreated {
            id: self.id.clone(),
            event_id,
            start: self.start,
            end: self.start + chrono::Duration::hours(2),
            location_ids: self.location_ids,
            ..draft_created()
        };
        let mut record = evolve(None, LifecycleEvent::DraftCreated(created)).unwrap();

        let transitions = match self.status {
            EventStatus::Draft | EventStatus::Deleted => Vec::new(),
            EventStatus::Pending => vec![LifecycleEvent::Submitted {
                stamp: stamp("user-1"),
            }],
            EventStatus::Approved => vec![
                LifecycleEvent::Submitted {
                    stamp: stamp("user-1"),
                },
                LifecycleEvent::Approved {
                    external_id: String::new(),
                    calendar_id: "primary".into(),
                    stamp: stamp("approver-1"),
                },
            ],
            EventStatus::Rejected => vec![
                LifecycleEvent::Submitted {
                    stamp: stamp("user-1"),
                },
                LifecycleEvent::Rejected {
                    reason: "double booked".into(),
                    stamp: stamp("approver-1"),
                },
            ],
        };
        for transition in transitions {
            record = evolve(Some(record), transition).unwrap();
        }
        if self.deleted {
            let previous_status = record.status;
            record = evolve(
                Some(record),
                LifecycleEvent::Deleted {
                    previous_status,
                    reason: None,
                    stamp: stamp("approver-1"),
                },
            )
            .unwrap();
        }

        record.external_id = self.external_id;
        record.unresolved_locations = self.unresolved;
        record
    }
}

pub struct LocationBuilder {
    id: String,
    name: String,
    aliases: Vec<String>,
    usage_count: u64,
    status: LocationStatus,
    merged_into: Option<String>,
}

impl Default for LocationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationBuilder {
    pub fn new() -> Self {
        Self {
            id: "loc-1".into(),
            name: "Fellowship Hall".into(),
            aliases: Vec::new(),
            usage_count: 0,
            status: LocationStatus::Approved,
            merged_into: None,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|alias| alias.to_string()).collect();
        self
    }

    pub fn usage_count(mut self, usage_count: u64) -> Self {
        self.usage_count = usage_count;
        self
    }

    pub fn status(mut self, status: LocationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn pending(self) -> Self {
        self.status(LocationStatus::Pending)
    }

    pub fn merged_into(mut self, target_id: &str) -> Self {
        self.status = LocationStatus::Merged;
        self.merged_into = Some(target_id.to_string());
        self
    }

    pub fn build(self) -> Location {
        let mut location = Location::new(
            self.id,
            self.name,
            LocationAttributes::default(),
            admin().user_id,
            t0(),
        );
        location.aliases = self.aliases;
        location.usage_count = self.usage_count;
        location.status = self.status;
        location.merged_into = self.merged_into;
        if self.status == LocationStatus::Approved {
            location.approved_by = Some(admin().user_id);
            location.approved_at = Some(t0());
        }
        location
    }
}

/// A one hour event at 10:00 New York time.
pub struct ExternalEventBuilder {
    id: String,
    day: u32,
}

impl ExternalEventBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            day: 5,
        }
    }

    pub fn on_day(mut self, day: u32) -> Self {
        self.day = day;
        self
    }

    pub fn build(self) -> ExternalEvent {
        let start = eastern()
            .with_ymd_and_hms(2024, 3, self.day, 10, 0, 0)
            .unwrap();
        ExternalEvent {
            title: format!("Service {}", self.id),
            id: self.id,
            calendar_id: "primary".into(),
            start,
            end: start + chrono::Duration::hours(1),
            time_zone: Some("America/New_York".into()),
            is_all_day: false,
            location: None,
            description: String::new(),
            categories: Vec::new(),
            registration_event_id: None,
            internal_event_id: None,
            extensions: BTreeMap::new(),
        }
    }
}

/// Location handler over fresh in-memory stores.
pub struct LocationContext {
    pub handler: Arc<LocationHandler>,
    pub locations: Arc<InMemoryLocationStore>,
    pub records: Arc<InMemoryEventRecords>,
}

impl Default for LocationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationContext {
    pub fn new() -> Self {
        let locations = Arc::new(InMemoryLocationStore::new());
        let records = Arc::new(InMemoryEventRecords::new());
        let handler = Arc::new(LocationHandler::new(
            locations.clone(),
            records.clone(),
            Arc::new(NoopListener),
            Arc::new(ManualClock::new(t0())),
            Arc::new(ProgressRegistry::new()),
        ));
        Self {
            handler,
            locations,
            records,
        }
    }

    pub async fn seed(&self, location: Location) {
        self.locations.insert(location).await.unwrap();
    }

    pub async fn seed_event(&self, record: EventRecord) {
        self.records.insert(record).await.unwrap();
    }

    pub async fn event(&self, id: &str) -> EventRecord {
        self.records.load(id).await.unwrap().unwrap().record
    }

    pub async fn location(&self, id: &str) -> Location {
        self.locations.load(id).await.unwrap().unwrap().record
    }
}

/// Application state over fresh adapters, a clock frozen at `t0()` and millisecond retries.
pub fn app_state() -> (AppState, Adapters) {
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.sync_retry = RetryPolicy::exponential(2, Duration::from_millis(1));
    let adapters = Adapters::default();
    let state = AppState::wire(&config, &adapters, Arc::new(ManualClock::new(t0())));
    (state, adapters)
}

pub fn as_caller(builder: Builder, actor: &Actor) -> Builder {
    let roles: Vec<&str> = actor
        .roles
        .iter()
        .map(|role| match role {
            Role::Requester => "requester",
            Role::Approver => "approver",
            Role::Admin => "admin",
        })
        .collect();
    builder
        .header(USER_ID_HEADER, actor.user_id.as_str())
        .header(USER_EMAIL_HEADER, actor.email.as_str())
        .header(USER_ROLES_HEADER, roles.join(","))
}
