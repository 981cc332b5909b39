//! Per-invocation accumulator of errors and the success payload

use std::collections::BTreeMap;

use serde_json::Value;

use crate::response::{Failure, FailureKind, Reply};

/// Field errors, general errors and the optional result of one workflow run.
///
/// An outcome is created with its engine and never outlives it. Every
/// operation is total: nothing here can fail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    field_errors: BTreeMap<String, String>,
    errors: Vec<String>,
    result: Option<Value>,
    operation_failed: bool,
}

impl Outcome {
    /// Create an empty outcome
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the message for `field`, replacing any earlier one
    pub fn set_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors.insert(field.into(), message.into());
    }

    /// Append a general (not field-scoped) error
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Append a generic message for a failed collaborator call.
    ///
    /// Marks the outcome as an operation failure so the transport can tell
    /// it apart from a validation failure. The message must not carry
    /// storage details; those go to the logger.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.operation_failed = true;
        self.errors.push(message.into());
    }

    /// True once any field or general error has been recorded
    pub fn has_errors(&self) -> bool {
        !self.field_errors.is_empty() || !self.errors.is_empty()
    }

    /// Record the success payload (last write wins)
    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.field_errors
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Classification surfaced to the transport when errors are present
    pub fn failure_kind(&self) -> FailureKind {
        if self.operation_failed {
            FailureKind::Operation
        } else {
            FailureKind::Validation
        }
    }

    /// Turn the accumulated state into the single reply for this run
    pub fn into_reply(self) -> Reply {
        if self.has_errors() {
            let kind = self.failure_kind();
            Reply::Failure(Failure {
                kind,
                errfor: self.field_errors,
                errors: self.errors,
            })
        } else {
            Reply::Success(self.result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fresh_outcome_has_no_errors() {
        let outcome = Outcome::new();
        assert!(!outcome.has_errors());
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_any_error_call_sets_has_errors() {
        let mut outcome = Outcome::new();
        outcome.set_field_error("name", "Required");
        assert!(outcome.has_errors());

        let mut outcome = Outcome::new();
        outcome.add_error("Cannot create empty album");
        assert!(outcome.has_errors());

        let mut outcome = Outcome::new();
        outcome.fail("Cannot create album");
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_field_error_last_write_wins() {
        let mut outcome = Outcome::new();
        outcome.set_field_error("email", "Required");
        outcome.set_field_error("email", "Invalid email");

        assert_eq!(outcome.field_errors().len(), 1);
        assert_eq!(outcome.field_errors()["email"], "Invalid email");
    }

    #[test]
    fn test_errors_keep_order() {
        let mut outcome = Outcome::new();
        outcome.add_error("first");
        outcome.add_error("second");
        assert_eq!(outcome.errors(), ["first", "second"]);
    }

    #[test]
    fn test_failure_kind() {
        let mut outcome = Outcome::new();
        outcome.add_error("bad input");
        assert_eq!(outcome.failure_kind(), FailureKind::Validation);

        outcome.fail("Cannot save");
        assert_eq!(outcome.failure_kind(), FailureKind::Operation);
    }

    #[test]
    fn test_into_reply_success_uses_last_result() {
        let mut outcome = Outcome::new();
        outcome.set_result(json!({"v": 1}));
        outcome.set_result(json!({"v": 2}));

        assert_eq!(outcome.into_reply(), Reply::Success(Some(json!({"v": 2}))));
    }

    #[test]
    fn test_into_reply_failure_drops_result() {
        let mut outcome = Outcome::new();
        outcome.set_result(json!("ignored"));
        outcome.set_field_error("name", "Required");

        match outcome.into_reply() {
            Reply::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Validation);
                assert_eq!(failure.errfor["name"], "Required");
                assert!(failure.errors.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
