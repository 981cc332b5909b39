//! Sign-in: check credentials and open a session

use std::sync::Arc;

use serde_json::{json, Value};

use kts_workflow::{
    async_trait, Completion, Document, DocumentStore, Flow, Logger, Request, Responder,
    Selector, Transition, Workflow, WorkflowEngine,
};

use super::{
    collaborator_failed, document, filter_user, now, str_of, Services, REQUIRED, SESSIONS, USERS,
};
use crate::security::{new_token, verify_password};

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigninStep {
    Validate,
    Authenticate,
    OpenSession,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Set once the password checks out
    pub user: Option<Document>,
}

pub struct Signin {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type SigninFlow = Flow<Credentials>;

impl Signin {
    fn validate(&self, mut flow: SigninFlow) -> Transition<SigninStep, Credentials> {
        let email = flow
            .request()
            .str_field("email")
            .map(|e| e.trim().to_lowercase());
        let password = flow.request().str_field("passw").map(str::to_string);

        if email.is_none() {
            flow.set_field_error("email", REQUIRED);
        }
        if password.is_none() {
            flow.set_field_error("passw", REQUIRED);
        }
        if flow.has_errors() {
            return flow.respond();
        }

        flow.state = Credentials {
            email: email.unwrap_or_default(),
            password: password.unwrap_or_default(),
            user: None,
        };
        flow.trigger(SigninStep::Authenticate)
    }

    async fn authenticate(&self, mut flow: SigninFlow) -> Transition<SigninStep, Credentials> {
        let selector = Selector::new()
            .eq("email", flow.state.email.as_str())
            .eq("activated", true);

        let user = match self.store.find_one(USERS, &selector).await {
            Ok(user) => user,
            Err(e) => {
                return collaborator_failed(
                    self.logger.as_ref(),
                    flow,
                    "Error while looking up account",
                    &e,
                    "Cannot sign in",
                )
            }
        };

        let verified = user.filter(|user| {
            match (str_of(user, "salt"), str_of(user, "password_hash")) {
                (Some(salt), Some(hash)) => verify_password(salt, &flow.state.password, hash),
                _ => false,
            }
        });

        match verified {
            Some(user) => {
                flow.state.user = Some(user);
                flow.trigger(SigninStep::OpenSession)
            }
            None => {
                tracing::debug!(email = %flow.state.email, "sign-in rejected");
                flow.add_error(INVALID_CREDENTIALS);
                flow.respond()
            }
        }
    }

    async fn open_session(&self, mut flow: SigninFlow) -> Transition<SigninStep, Credentials> {
        let Some(user) = flow.state.user.take() else {
            flow.fail("Cannot sign in");
            return flow.respond();
        };

        let token = new_token();
        let session = document([
            ("token", json!(token)),
            ("user_id", user.get("_id").cloned().unwrap_or(Value::Null)),
            ("email", user.get("email").cloned().unwrap_or(Value::Null)),
            ("username", user.get("username").cloned().unwrap_or(Value::Null)),
            ("active", json!(true)),
            ("created_at", now()),
        ]);

        match self.store.insert_one(SESSIONS, session).await {
            Ok(_) => {
                flow.set_result(json!({
                    "token": token,
                    "user": filter_user(user),
                }));
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while opening session",
                &e,
                "Cannot sign in",
            ),
        }
    }
}

#[async_trait]
impl Workflow for Signin {
    type Step = SigninStep;
    type State = Credentials;

    fn name(&self) -> &str {
        "signin"
    }

    async fn step(
        &self,
        step: SigninStep,
        flow: SigninFlow,
    ) -> Transition<SigninStep, Credentials> {
        match step {
            SigninStep::Validate => self.validate(flow),
            SigninStep::Authenticate => self.authenticate(flow).await,
            SigninStep::OpenSession => self.open_session(flow).await,
        }
    }
}

/// `POST /login` with `{ email, passw }`
pub async fn signin(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<SigninStep> {
    let workflow = Signin {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, Credentials::default(), responder)
        .with_logger(services.logger)
        .run(SigninStep::Validate)
        .await
}
