use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::modules::events::adapters::outbound::event_records_in_memory::InMemoryEventRecords;
use crate::modules::events::use_cases::lifecycle::handler::LifecycleHandler;
use crate::modules::events::use_cases::list_events::handler::EventQueries;
use crate::modules::locations::adapters::outbound::location_store_in_memory::InMemoryLocationStore;
use crate::modules::locations::use_cases::handler::LocationHandler;
use crate::modules::sync::adapters::outbound::calendar_source_in_memory::InMemoryCalendar;
use crate::modules::sync::use_cases::load_events::cache::EventCache;
use crate::modules::sync::use_cases::load_events::handler::EventLoader;
use crate::modules::sync::use_cases::reconcile::handler::Reconciler;
use crate::shared::core::primitives::Clock;
use crate::shared::infrastructure::progress::ProgressRegistry;
use crate::shell::config::AppConfig;

/// Concrete adapters behind the ports. In memory until real backends are wired.
#[derive(Clone, Default)]
pub struct Adapters {
    pub records: Arc<InMemoryEventRecords>,
    pub locations: Arc<InMemoryLocationStore>,
    pub calendar: Arc<InMemoryCalendar>,
}

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleHandler>,
    pub queries: Arc<EventQueries>,
    pub locations: Arc<LocationHandler>,
    pub reconciler: Arc<Reconciler>,
    pub loader: Arc<EventLoader>,
    pub cache: Arc<EventCache>,
    pub calendar_ids: Vec<String>,
    /// Parent of every token handed to long running operations.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn wire(config: &AppConfig, adapters: &Adapters, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(config.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let cache = Arc::new(EventCache::new(ttl, clock.clone()));

        let lifecycle = Arc::new(LifecycleHandler::new(
            adapters.records.clone(),
            adapters.calendar.clone(),
            adapters.locations.clone(),
            cache.clone(),
            clock.clone(),
            config.default_calendar_id.clone(),
        ));
        let locations = Arc::new(LocationHandler::new(
            adapters.locations.clone(),
            adapters.records.clone(),
            cache.clone(),
            clock.clone(),
            Arc::new(ProgressRegistry::new()),
        ));
        let reconciler = Arc::new(Reconciler::new(
            adapters.calendar.clone(),
            adapters.records.clone(),
            adapters.locations.clone(),
            cache.clone(),
            clock.clone(),
            config.sync_retry.clone(),
        ));
        let loader = Arc::new(EventLoader::new(
            cache.clone(),
            reconciler.clone(),
            adapters.records.clone(),
            clock,
            config.sync_retry.clone(),
        ));

        Self {
            lifecycle,
            queries: Arc::new(EventQueries::new(adapters.records.clone())),
            locations,
            reconciler,
            loader,
            cache,
            calendar_ids: config.calendar_ids.clone(),
            shutdown: CancellationToken::new(),
        }
    }
}
