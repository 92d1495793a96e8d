// Caller identity from request headers.
//
// Authentication happens in front of this service. It forwards the verified identity in
// `x-user-id`, `x-user-email` and `x-user-roles` (comma separated).

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::shared::core::primitives::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLES_HEADER: &str = "x-user-roles";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Actor);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Unknown role names are ignored. Without any recognised role the caller is a requester.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let user_id = header(headers, USER_ID_HEADER)?;
    let email = header(headers, USER_EMAIL_HEADER)?;
    let mut roles: Vec<Role> = header(headers, USER_ROLES_HEADER)
        .unwrap_or_default()
        .split(',')
        .filter_map(|role| Role::parse(role.trim()))
        .collect();
    if roles.is_empty() {
        roles.push(Role::Requester);
    }
    Some(Actor::new(user_id, email, roles))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers).map(Caller).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "unauthenticated",
                    "message": "x-user-id and x-user-email headers are required",
                })),
            )
                .into_response()
        })
    }
}
