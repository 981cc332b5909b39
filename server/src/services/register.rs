//! Account registration
//!
//! Creates an inactive user holding a one-time activation token. The token
//! is logged instead of mailed.

use std::sync::Arc;

use serde_json::json;

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    StoreError, Transition, Workflow, WorkflowEngine,
};

use super::{collaborator_failed, document, filter_user, now, str_of, Services, REQUIRED, USERS};
use crate::security::new_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterStep {
    Validate,
    CheckDuplicate,
    Create,
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub phone: String,
}

pub struct Register {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type RegisterFlow = Flow<Registration>;

/// Loose shape check: one `@`, something before it, a dotted domain after
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

impl Register {
    fn validate(&self, mut flow: RegisterFlow) -> Transition<RegisterStep, Registration> {
        let email = flow
            .request()
            .str_field("email")
            .map(|e| e.trim().to_lowercase());
        let phone = flow.request().str_field("phone").map(|p| p.trim().to_string());

        match &email {
            None => flow.set_field_error("email", REQUIRED),
            Some(email) if !is_email(email) => flow.set_field_error("email", "Invalid email"),
            Some(_) => {}
        }
        if phone.is_none() {
            flow.set_field_error("phone", REQUIRED);
        }

        if flow.has_errors() {
            return flow.respond();
        }

        flow.state = Registration {
            email: email.unwrap_or_default(),
            phone: phone.unwrap_or_default(),
        };
        flow.trigger(RegisterStep::CheckDuplicate)
    }

    async fn check_duplicate(
        &self,
        mut flow: RegisterFlow,
    ) -> Transition<RegisterStep, Registration> {
        let selector = Selector::new().eq("email", flow.state.email.as_str());
        match self.store.find_one(USERS, &selector).await {
            Ok(Some(_)) => {
                flow.set_field_error("email", "Email already registered");
                flow.respond()
            }
            Ok(None) => flow.trigger(RegisterStep::Create),
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while looking up email",
                &e,
                "Cannot register account",
            ),
        }
    }

    async fn create(&self, mut flow: RegisterFlow) -> Transition<RegisterStep, Registration> {
        let token = new_token();
        let user = document([
            ("email", json!(flow.state.email)),
            ("phone", json!(flow.state.phone)),
            ("activated", json!(false)),
            ("activation_token", json!(token)),
            ("created_at", now()),
        ]);

        match self.store.insert_unique(USERS, user, &["email"]).await {
            Ok(user) => {
                tracing::info!(
                    email = str_of(&user, "email").unwrap_or_default(),
                    activation_token = %token,
                    "account registered, awaiting activation"
                );
                flow.set_result(filter_user(user));
                flow.respond()
            }
            Err(StoreError::Duplicate { .. }) => {
                flow.set_field_error("email", "Email already registered");
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while creating account",
                &e,
                "Cannot register account",
            ),
        }
    }
}

#[async_trait]
impl Workflow for Register {
    type Step = RegisterStep;
    type State = Registration;

    fn name(&self) -> &str {
        "register"
    }

    async fn step(
        &self,
        step: RegisterStep,
        flow: RegisterFlow,
    ) -> Transition<RegisterStep, Registration> {
        match step {
            RegisterStep::Validate => self.validate(flow),
            RegisterStep::CheckDuplicate => self.check_duplicate(flow).await,
            RegisterStep::Create => self.create(flow).await,
        }
    }
}

/// `POST /register` with `{ email, phone }`
pub async fn register(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<RegisterStep> {
    let workflow = Register {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, Registration::default(), responder)
        .with_logger(services.logger)
        .run(RegisterStep::Validate)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_email() {
        assert!(is_email("ann@example.com"));
        assert!(is_email("a.b+c@mail.example.org"));
        assert!(!is_email("ann"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("ann@example"));
        assert!(!is_email("ann@.com"));
        assert!(!is_email("ann@@example.com"));
        assert!(!is_email("an n@example.com"));
    }
}
