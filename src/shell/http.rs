use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Extension, Router,
    http::HeaderMap,
    response::Html,
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::modules::events::adapters::inbound::http as events_http;
use crate::modules::locations::adapters::inbound::http as locations_http;
use crate::modules::sync::adapters::inbound::http as sync_http;
use crate::shell::graphql::{AppSchema, build_schema};
use crate::shell::identity::actor_from_headers;
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    let schema = build_schema(state.clone());
    Router::new()
        .merge(events_http::routes())
        .merge(locations_http::routes())
        .merge(sync_http::routes())
        .route("/gql", get(graphiql).post(graphql))
        .with_state(state)
        .layer(Extension(schema))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn graphql(
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    if let Some(actor) = actor_from_headers(&headers) {
        request = request.data(actor);
    }
    schema.execute(request).await.into()
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/gql").finish())
}
