use async_graphql::{EmptySubscription, MergedObject, Schema};

use crate::modules::events::adapters::inbound::graphql::{EventMutation, EventQuery};
use crate::modules::locations::adapters::inbound::graphql::LocationQuery;
use crate::shell::state::AppState;

#[derive(MergedObject, Default)]
pub struct QueryRoot(EventQuery, LocationQuery);

#[derive(MergedObject, Default)]
pub struct MutationRoot(EventMutation);

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Mutations read the caller from request data, see `shell::http::graphql`.
pub fn build_schema(state: AppState) -> AppSchema {
    Schema::build(
        QueryRoot::default(),
        MutationRoot::default(),
        EmptySubscription,
    )
    .data(state)
    .finish()
}

#[cfg(test)]
mod schema_tests {
    use crate::modules::locations::adapters::outbound::location_store::LocationStore;
    use crate::tests::fixtures::{LocationBuilder, app_state};

    use super::build_schema;

    #[tokio::test]
    async fn it_should_serve_location_queries_next_to_event_queries() {
        let (state, adapters) = app_state();
        adapters
            .locations
            .insert(LocationBuilder::new().id("loc-hall").name("Fellowship Hall").build())
            .await
            .unwrap();
        let schema = build_schema(state);

        let response = schema
            .execute(r#"{ locations(status: APPROVED) { id name } events { id } }"#)
            .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let json = response.data.into_json().unwrap();
        assert_eq!(json["locations"][0]["name"], "Fellowship Hall");
        assert_eq!(json["events"].as_array().unwrap().len(), 0);
    }
}
