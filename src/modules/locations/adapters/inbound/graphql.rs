use async_graphql::{Context, Enum, Object, Result as GqlResult, SimpleObject};

use crate::modules::events::adapters::inbound::graphql::gql_error;
use crate::modules::locations::core::location::{Location, LocationStatus};
use crate::modules::locations::core::resolver::UnassignedLocationString;
use crate::shell::state::AppState;

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
#[graphql(name = "LocationStatus")]
pub enum LocationStatusGql {
    Pending,
    Approved,
    Merged,
    Deleted,
}

impl From<LocationStatus> for LocationStatusGql {
    fn from(status: LocationStatus) -> Self {
        match status {
            LocationStatus::Pending => Self::Pending,
            LocationStatus::Approved => Self::Approved,
            LocationStatus::Merged => Self::Merged,
            LocationStatus::Deleted => Self::Deleted,
        }
    }
}

impl From<LocationStatusGql> for LocationStatus {
    fn from(status: LocationStatusGql) -> Self {
        match status {
            LocationStatusGql::Pending => Self::Pending,
            LocationStatusGql::Approved => Self::Approved,
            LocationStatusGql::Merged => Self::Merged,
            LocationStatusGql::Deleted => Self::Deleted,
        }
    }
}

#[derive(SimpleObject)]
pub struct LocationView {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub usage_count: u64,
    pub status: LocationStatusGql,
    pub building: Option<String>,
    pub capacity: Option<u32>,
    pub merged_into: Option<String>,
}

impl From<Location> for LocationView {
    fn from(location: Location) -> Self {
        Self {
            id: location.id,
            name: location.name,
            aliases: location.aliases,
            usage_count: location.usage_count,
            status: location.status.into(),
            building: location.attributes.building,
            capacity: location.attributes.capacity,
            merged_into: location.merged_into,
        }
    }
}

#[derive(SimpleObject)]
pub struct UnassignedView {
    pub raw: String,
    pub event_count: usize,
    pub suggested_location_ids: Vec<String>,
}

impl From<UnassignedLocationString> for UnassignedView {
    fn from(unassigned: UnassignedLocationString) -> Self {
        Self {
            raw: unassigned.raw,
            event_count: unassigned.event_count,
            suggested_location_ids: unassigned
                .suggestions
                .into_iter()
                .map(|suggestion| suggestion.location_id)
                .collect(),
        }
    }
}

#[derive(Default)]
pub struct LocationQuery;

#[Object]
impl LocationQuery {
    async fn locations(
        &self,
        context: &Context<'_>,
        status: Option<LocationStatusGql>,
    ) -> GqlResult<Vec<LocationView>> {
        let state = context.data_unchecked::<AppState>();
        let locations = state
            .locations
            .list_locations(status.map(Into::into))
            .await
            .map_err(gql_error)?;
        Ok(locations.into_iter().map(Into::into).collect())
    }

    async fn unassigned_location_strings(
        &self,
        context: &Context<'_>,
    ) -> GqlResult<Vec<UnassignedView>> {
        let state = context.data_unchecked::<AppState>();
        let unassigned = state.locations.list_unassigned().await.map_err(gql_error)?;
        Ok(unassigned.into_iter().map(Into::into).collect())
    }
}
