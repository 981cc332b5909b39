//! Session authentication for API handlers
//!
//! Clients send the token returned by `POST /api/login` as
//! `Authorization: Bearer <token>`. Tokens resolve against active
//! documents in the `sessions` collection.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::Response,
};
use serde_json::Value;

use kts_workflow::{Document, DocumentStore, FailureKind, Identity, Selector, StoreError};

use super::reply::failure_response;
use super::state::AppState;
use crate::services::{NOT_SIGNED_IN, SESSIONS};

/// Bearer token from the `Authorization` header, if well formed
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Identity behind an active session token
pub async fn resolve_session(
    store: &dyn DocumentStore,
    token: &str,
) -> Result<Option<Identity>, StoreError> {
    let selector = Selector::new().eq("token", token).eq("active", true);
    Ok(store
        .find_one(SESSIONS, &selector)
        .await?
        .and_then(|session| identity_of(&session, token)))
}

fn identity_of(session: &Document, token: &str) -> Option<Identity> {
    let text = |field: &str| session.get(field).and_then(Value::as_str).map(str::to_string);
    Some(Identity {
        user_id: text("user_id")?,
        email: text("email").unwrap_or_default(),
        username: text("username"),
        session: token.to_string(),
    })
}

async fn lookup(parts: &Parts, state: &AppState) -> Result<Option<Identity>, Response> {
    let Some(token) = bearer_token(parts) else {
        return Ok(None);
    };

    resolve_session(state.services.store.as_ref(), token)
        .await
        .map_err(|e| {
            state.services.logger.error("Error while resolving session", &e);
            failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                FailureKind::Operation,
                "Cannot resolve session",
            )
        })
}

/// The caller, when a valid session token was sent
pub struct CurrentUser(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        lookup(parts, state).await.map(CurrentUser)
    }
}

/// A signed-in caller; anything else is rejected with 401
pub struct SignedIn(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for SignedIn {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match lookup(parts, state).await? {
            Some(identity) => Ok(SignedIn(identity)),
            None => {
                tracing::warn!("Missing or invalid session token for {}", parts.uri.path());
                Err(failure_response(
                    StatusCode::UNAUTHORIZED,
                    FailureKind::Validation,
                    NOT_SIGNED_IN,
                ))
            }
        }
    }
}
