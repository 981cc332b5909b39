//! Request descriptor handed to every step

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The signed-in user a request runs on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Session token the identity was resolved from
    pub session: String,
}

/// Already-parsed request: body payload, path parameters and identity.
///
/// The engine never interprets this; it only hands it to step handlers.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub body: Value,
    pub params: HashMap<String, String>,
    pub identity: Option<Identity>,
}

impl Request {
    /// Create a request with the given body
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    /// Add a path parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Attach the caller identity
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Raw body field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Body field as a non-empty string (whitespace-only counts as empty)
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}
