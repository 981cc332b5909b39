//! Request services
//!
//! Every service runs one workflow per request: a validation step that
//! short-circuits to the reply when input is bad, then one or more
//! persistence steps that record a result or a generic failure.

pub mod activate;
pub mod album;
pub mod pages;
pub mod photos;
pub mod profile;
pub mod register;
pub mod signin;
pub mod signout;

use std::sync::Arc;

use serde_json::Value;

use kts_workflow::{Document, DocumentStore, Flow, Identity, Logger, StepId, StoreError, Transition};

/// Collection names
pub const USERS: &str = "users";
pub const PAGES: &str = "pages";
pub const SESSIONS: &str = "sessions";

pub const REQUIRED: &str = "Required";
pub const NOT_SIGNED_IN: &str = "Not signed in";
pub const PAGE_NOT_FOUND: &str = "Page not found";

/// Fields never sent back to a client
const PRIVATE_USER_FIELDS: [&str; 3] = ["password_hash", "salt", "activation_token"];

/// Collaborators shared by all services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub logger: Arc<dyn Logger>,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, logger: Arc<dyn Logger>) -> Self {
        Self { store, logger }
    }
}

/// Log a failed collaborator call, record `message` and respond
pub(crate) fn collaborator_failed<S: StepId, D>(
    logger: &dyn Logger,
    mut flow: Flow<D>,
    context: &str,
    err: &StoreError,
    message: &str,
) -> Transition<S, D> {
    logger.error(context, err);
    flow.fail(message);
    flow.respond()
}

/// The caller identity, or a recorded "not signed in" error
pub(crate) fn require_identity<D>(flow: &mut Flow<D>) -> Option<Identity> {
    let identity = flow.request().identity.clone();
    if identity.is_none() {
        flow.add_error(NOT_SIGNED_IN);
    }
    identity
}

/// User document with credentials and tokens removed
pub fn filter_user(mut user: Document) -> Value {
    for field in PRIVATE_USER_FIELDS {
        user.remove(field);
    }
    Value::Object(user)
}

/// Build a document from field/value pairs
pub(crate) fn document<const N: usize>(fields: [(&str, Value); N]) -> Document {
    fields
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

pub(crate) fn str_of<'a>(document: &'a Document, field: &str) -> Option<&'a str> {
    document.get(field).and_then(Value::as_str)
}

pub(crate) fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}
