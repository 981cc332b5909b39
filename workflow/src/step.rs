//! Step identifiers, the owned flow handle and step transitions

use std::fmt::Debug;
use std::hash::Hash;

use serde_json::Value;

use crate::outcome::Outcome;
use crate::request::Request;

/// Anything usable as a step name.
///
/// Services use a fieldless enum per workflow; `&'static str` works too.
pub trait StepId: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> StepId for T where T: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

/// The state a workflow run carries from step to step.
///
/// Exactly one handler owns the flow at a time: it is moved into the
/// handler and moved back out through the [`Transition`] it returns.
#[derive(Debug)]
pub struct Flow<D> {
    outcome: Outcome,
    request: Request,
    /// Data a step stashes for its successors
    pub state: D,
}

impl<D> Flow<D> {
    /// Start a flow with a fresh outcome
    pub fn new(request: Request, state: D) -> Self {
        Self {
            outcome: Outcome::new(),
            request,
            state,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn outcome_mut(&mut self) -> &mut Outcome {
        &mut self.outcome
    }

    pub fn set_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.outcome.set_field_error(field, message);
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.outcome.add_error(message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.outcome.fail(message);
    }

    pub fn has_errors(&self) -> bool {
        self.outcome.has_errors()
    }

    pub fn set_result(&mut self, value: Value) {
        self.outcome.set_result(value);
    }

    /// Hand the flow to `step`, which runs as its own unit of work
    pub fn trigger<S: StepId>(self, step: S) -> Transition<S, D> {
        Transition {
            flow: self,
            next: Next::Step(step),
        }
    }

    /// Finish the run: the outcome is rendered and written back once
    pub fn respond<S: StepId>(self) -> Transition<S, D> {
        Transition {
            flow: self,
            next: Next::Respond,
        }
    }

    pub(crate) fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

pub(crate) enum Next<S> {
    Step(S),
    Respond,
    Unregistered(S),
}

/// What a step handler returns: the flow plus where it goes next
pub struct Transition<S, D> {
    pub(crate) flow: Flow<D>,
    pub(crate) next: Next<S>,
}

impl<S: StepId, D> Transition<S, D> {
    pub(crate) fn unregistered(flow: Flow<D>, step: S) -> Self {
        Self {
            flow,
            next: Next::Unregistered(step),
        }
    }

    pub fn flow(&self) -> &Flow<D> {
        &self.flow
    }

    /// The step scheduled next, if this transition continues the chain
    pub fn next_step(&self) -> Option<S> {
        match self.next {
            Next::Step(step) => Some(step),
            Next::Respond | Next::Unregistered(_) => None,
        }
    }

    /// True when this transition ends the run with a reply
    pub fn responds(&self) -> bool {
        matches!(self.next, Next::Respond)
    }

    pub fn into_flow(self) -> Flow<D> {
        self.flow
    }
}
