//! Account activation: choose credentials for a registered email

use std::sync::Arc;

use serde_json::Value;

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    Transition, Update, Workflow, WorkflowEngine,
};

use super::{collaborator_failed, filter_user, now, Services, REQUIRED, USERS};
use crate::security::{hash_password, new_token};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivateStep {
    Validate,
    Activate,
}

#[derive(Debug, Clone, Default)]
pub struct Activation {
    pub token: String,
    pub username: String,
    pub password: String,
}

pub struct Activate {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type ActivateFlow = Flow<Activation>;

impl Activate {
    fn validate(&self, mut flow: ActivateFlow) -> Transition<ActivateStep, Activation> {
        let request = flow.request();
        let token = request.param("token").filter(|t| !t.is_empty()).map(str::to_string);
        let username = request.str_field("username").map(|u| u.trim().to_string());
        let password = request.str_field("password").map(str::to_string);
        let confirm = request.str_field("confirm").map(str::to_string);

        if token.is_none() {
            flow.add_error("Activation token required");
        }
        if username.is_none() {
            flow.set_field_error("username", REQUIRED);
        }
        match &password {
            None => flow.set_field_error("password", REQUIRED),
            Some(p) if p.chars().count() < MIN_PASSWORD_LEN => flow.set_field_error(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            ),
            Some(p) if confirm.as_deref() != Some(p.as_str()) => {
                flow.set_field_error("confirm", "Passwords do not match")
            }
            Some(_) => {}
        }

        if flow.has_errors() {
            return flow.respond();
        }

        flow.state = Activation {
            token: token.unwrap_or_default(),
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
        };
        flow.trigger(ActivateStep::Activate)
    }

    async fn activate(&self, mut flow: ActivateFlow) -> Transition<ActivateStep, Activation> {
        let activation = std::mem::take(&mut flow.state);
        let salt = new_token();

        let selector = Selector::new()
            .eq("activation_token", activation.token.as_str())
            .eq("activated", false);
        let update = Update::new()
            .set("username", activation.username.as_str())
            .set("password_hash", hash_password(&salt, &activation.password))
            .set("salt", salt)
            .set("activated", true)
            .set("activation_token", Value::Null)
            .set("activated_at", now());

        match self.store.find_one_and_update(USERS, &selector, &update).await {
            Ok(Some(user)) => {
                flow.set_result(filter_user(user));
                flow.respond()
            }
            Ok(None) => {
                flow.add_error("Invalid or expired activation token");
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while activating account",
                &e,
                "Cannot activate account",
            ),
        }
    }
}

#[async_trait]
impl Workflow for Activate {
    type Step = ActivateStep;
    type State = Activation;

    fn name(&self) -> &str {
        "activate"
    }

    async fn step(
        &self,
        step: ActivateStep,
        flow: ActivateFlow,
    ) -> Transition<ActivateStep, Activation> {
        match step {
            ActivateStep::Validate => self.validate(flow),
            ActivateStep::Activate => self.activate(flow).await,
        }
    }
}

/// `POST /activate/:token` with `{ username, password, confirm }`
pub async fn activate(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<ActivateStep> {
    let workflow = Activate {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, Activation::default(), responder)
        .with_logger(services.logger)
        .run(ActivateStep::Validate)
        .await
}
