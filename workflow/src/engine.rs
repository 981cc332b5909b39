//! Workflow execution engine
//!
//! Drives one request through its steps:
//! - Each step runs as a separately scheduled unit of work
//! - Exactly one successor per step, chosen by the step itself
//! - The run ends with a single reply, a stall, or a gone client

use std::sync::Arc;

use crate::error::WorkflowError;
use crate::log::{Logger, TracingLogger};
use crate::registry::{StepRegistry, Workflow};
use crate::request::Request;
use crate::response::{Finalize, OutcomeFinalizer, ReplyKind, Responder, ResponseError};
use crate::step::{Flow, Next, StepId, Transition};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<S> {
    /// The reply was written
    Responded(ReplyKind),
    /// A step triggered something with no handler; nothing was written
    Stalled { step: S },
    /// The transport stopped listening before the reply was ready
    Disconnected,
    /// The responder had already been used; the second write was refused
    Rejected,
}

impl<S> Completion<S> {
    pub fn is_responded(&self) -> bool {
        matches!(self, Completion::Responded(_))
    }
}

/// One workflow run bound to one request and one response channel.
///
/// [`run`](Self::run) consumes the engine, so handlers cannot be added once
/// the first step has been triggered and the engine cannot be reused.
pub struct WorkflowEngine<W: Workflow> {
    workflow: W,
    flow: Flow<W::State>,
    responder: Responder,
    finalizer: Box<dyn Finalize>,
    logger: Arc<dyn Logger>,
}

impl<W: Workflow> WorkflowEngine<W> {
    /// Bind `workflow` to a request, an initial stash and a response channel
    pub fn new(workflow: W, request: Request, state: W::State, responder: Responder) -> Self {
        Self {
            workflow,
            flow: Flow::new(request, state),
            responder,
            finalizer: Box::new(OutcomeFinalizer),
            logger: Arc::new(TracingLogger),
        }
    }

    /// Set the logger defects are reported to
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Replace how the terminal step renders the outcome
    pub fn with_finalizer(mut self, finalizer: impl Finalize + 'static) -> Self {
        self.finalizer = Box::new(finalizer);
        self
    }

    pub fn name(&self) -> &str {
        self.workflow.name()
    }

    /// Trigger `first` and drive the chain until it ends
    pub async fn run(self, first: W::Step) -> Completion<W::Step> {
        let Self {
            workflow,
            mut flow,
            mut responder,
            finalizer,
            logger,
        } = self;

        let mut current = first;
        loop {
            // Hand control back to the scheduler so the step starts as a
            // fresh unit of work rather than nesting in its predecessor.
            tokio::task::yield_now().await;

            tracing::debug!(workflow = workflow.name(), step = ?current, "running step");
            let Transition { flow: returned, next } = workflow.step(current, flow).await;
            flow = returned;

            match next {
                Next::Step(step) => current = step,
                Next::Respond => {
                    let completion = finish(
                        workflow.name(),
                        flow,
                        &mut responder,
                        finalizer.as_ref(),
                        logger.as_ref(),
                    );
                    tracing::debug!(workflow = workflow.name(), ?completion, "workflow finished");
                    return completion;
                }
                Next::Unregistered(step) => {
                    let defect = WorkflowError::UnregisteredStep {
                        workflow: workflow.name().to_string(),
                        step: format!("{:?}", step),
                    };
                    logger.error("workflow stalled", &defect);
                    return Completion::Stalled { step };
                }
            }
        }
    }
}

impl<S: StepId, D: Send + 'static> WorkflowEngine<StepRegistry<S, D>> {
    /// Register a handler; a later registration for the same step replaces it
    pub fn on<F, Fut>(&mut self, step: S, handler: F) -> &mut Self
    where
        F: Fn(Flow<D>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Transition<S, D>> + Send + 'static,
    {
        self.workflow.on(step, handler);
        self
    }
}

/// The "response" step: render the outcome and write it at most once
fn finish<S, D>(
    name: &str,
    flow: Flow<D>,
    responder: &mut Responder,
    finalizer: &dyn Finalize,
    logger: &dyn Logger,
) -> Completion<S> {
    if responder.is_spent() {
        let defect = WorkflowError::AlreadyResponded {
            workflow: name.to_string(),
        };
        logger.error("refusing second reply", &defect);
        return Completion::Rejected;
    }

    if !responder.is_writable() {
        tracing::warn!(workflow = name, "response channel closed before reply");
        return Completion::Disconnected;
    }

    let reply = finalizer.finalize(flow.into_outcome());
    match responder.send(reply) {
        Ok(kind) => Completion::Responded(kind),
        Err(ResponseError::Closed) => {
            tracing::warn!(workflow = name, "response channel closed during reply");
            Completion::Disconnected
        }
        Err(ResponseError::AlreadySent) => {
            let defect = WorkflowError::AlreadyResponded {
                workflow: name.to_string(),
            };
            logger.error("refusing second reply", &defect);
            Completion::Rejected
        }
    }
}
