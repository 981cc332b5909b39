//! Sign-out: close the caller's session, then drop the caller's closed
//! sessions so the collection only keeps live ones

use std::sync::Arc;

use serde_json::json;

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    Transition, Update, Workflow, WorkflowEngine,
};

use super::{collaborator_failed, now, require_identity, Services, SESSIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignoutStep {
    Validate,
    CloseSession,
    Prune,
}

pub struct Signout {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

#[derive(Debug, Clone, Default)]
pub struct Closing {
    pub token: String,
    pub user_id: String,
}

type SignoutFlow = Flow<Closing>;

impl Signout {
    fn validate(&self, mut flow: SignoutFlow) -> Transition<SignoutStep, Closing> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };
        flow.state = Closing {
            token: identity.session,
            user_id: identity.user_id,
        };
        flow.trigger(SignoutStep::CloseSession)
    }

    async fn close_session(&self, flow: SignoutFlow) -> Transition<SignoutStep, Closing> {
        let selector = Selector::new()
            .eq("token", flow.state.token.as_str())
            .eq("active", true);
        let update = Update::new().set("active", false).set("closed_at", now());

        // An already-closed session still signs out
        match self.store.find_one_and_update(SESSIONS, &selector, &update).await {
            Ok(_) => flow.trigger(SignoutStep::Prune),
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while closing session",
                &e,
                "Cannot sign out",
            ),
        }
    }

    /// The session is already closed, so a failed cleanup still signs out
    async fn prune(&self, mut flow: SignoutFlow) -> Transition<SignoutStep, Closing> {
        let closed = Selector::new()
            .eq("user_id", flow.state.user_id.as_str())
            .eq("active", false);

        match self.store.delete_many(SESSIONS, &closed).await {
            Ok(count) => {
                tracing::debug!(user_id = %flow.state.user_id, count, "closed sessions pruned")
            }
            Err(e) => self.logger.error("Error while pruning sessions", &e),
        }
        flow.set_result(json!({ "signedOut": true }));
        flow.respond()
    }
}

#[async_trait]
impl Workflow for Signout {
    type Step = SignoutStep;
    type State = Closing;

    fn name(&self) -> &str {
        "signout"
    }

    async fn step(&self, step: SignoutStep, flow: SignoutFlow) -> Transition<SignoutStep, Closing> {
        match step {
            SignoutStep::Validate => self.validate(flow),
            SignoutStep::CloseSession => self.close_session(flow).await,
            SignoutStep::Prune => self.prune(flow).await,
        }
    }
}

/// `POST /logout`
pub async fn signout(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<SignoutStep> {
    let workflow = Signout {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, Closing::default(), responder)
        .with_logger(services.logger)
        .run(SignoutStep::Validate)
        .await
}
