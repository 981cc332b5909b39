//! Step dispatch: the `Workflow` trait and the dynamic `StepRegistry`

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::step::{Flow, StepId, Transition};

/// A set of steps the engine can dispatch to.
///
/// Implementations normally `match` exhaustively over their step enum, so
/// every step a handler can trigger is known to have a body.
///
/// ```rust,ignore
/// #[async_trait]
/// impl Workflow for CreateAlbum {
///     type Step = AlbumStep;
///     type State = Option<Album>;
///
///     fn name(&self) -> &str { "create_album" }
///
///     async fn step(
///         &self,
///         step: AlbumStep,
///         flow: Flow<Self::State>,
///     ) -> Transition<AlbumStep, Self::State> {
///         match step {
///             AlbumStep::Validate => self.validate(flow),
///             AlbumStep::Create => self.create(flow).await,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Workflow: Send + Sync {
    type Step: StepId;
    type State: Send + 'static;

    /// Name used in logs
    fn name(&self) -> &str;

    /// Run one step to completion and say where the flow goes next
    async fn step(
        &self,
        step: Self::Step,
        flow: Flow<Self::State>,
    ) -> Transition<Self::Step, Self::State>;
}

/// Boxed future returned by registered handlers
pub type StepFuture<S, D> = Pin<Box<dyn Future<Output = Transition<S, D>> + Send>>;

type Handler<S, D> = Box<dyn Fn(Flow<D>) -> StepFuture<S, D> + Send + Sync>;

/// Steps registered by name at runtime.
///
/// Registering a step twice replaces the earlier handler. Triggering a
/// step that was never registered stalls the run.
pub struct StepRegistry<S, D> {
    name: String,
    handlers: HashMap<S, Handler<S, D>>,
}

impl<S: StepId, D: Send + 'static> StepRegistry<S, D> {
    /// Create an empty registry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `step`. Returns true if it replaced one.
    pub fn on<F, Fut>(&mut self, step: S, handler: F) -> bool
    where
        F: Fn(Flow<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Transition<S, D>> + Send + 'static,
    {
        let handler: Handler<S, D> = Box::new(move |flow| Box::pin(handler(flow)));
        let replaced = self.handlers.insert(step, handler).is_some();
        if replaced {
            tracing::debug!(workflow = %self.name, step = ?step, "replaced step handler");
        }
        replaced
    }

    pub fn contains(&self, step: &S) -> bool {
        self.handlers.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl<S: StepId, D: Send + 'static> Workflow for StepRegistry<S, D> {
    type Step = S;
    type State = D;

    fn name(&self) -> &str {
        &self.name
    }

    async fn step(&self, step: S, flow: Flow<D>) -> Transition<S, D> {
        match self.handlers.get(&step) {
            Some(handler) => handler(flow).await,
            None => Transition::unregistered(flow, step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use serde_json::json;

    #[tokio::test]
    async fn test_registered_step_runs() {
        let mut registry = StepRegistry::<&'static str, ()>::new("test");
        registry.on("validate", |flow| async move { flow.trigger("save") });

        let t = registry.step("validate", Flow::new(Request::default(), ())).await;
        assert_eq!(t.next_step(), Some("save"));
    }

    #[tokio::test]
    async fn test_second_registration_replaces_first() {
        let mut registry = StepRegistry::<&'static str, ()>::new("test");
        assert!(!registry.on("validate", |mut flow| async move {
            flow.set_result(json!("first"));
            flow.respond()
        }));
        assert!(registry.on("validate", |mut flow| async move {
            flow.set_result(json!("second"));
            flow.respond()
        }));
        assert_eq!(registry.len(), 1);

        for _ in 0..2 {
            let t = registry.step("validate", Flow::new(Request::default(), ())).await;
            assert_eq!(t.flow().outcome().result(), Some(&json!("second")));
        }
    }

    #[tokio::test]
    async fn test_missing_step_is_unregistered() {
        let registry = StepRegistry::<&'static str, ()>::new("test");
        assert!(registry.is_empty());

        let t = registry.step("nowhere", Flow::new(Request::default(), ())).await;
        assert!(!t.responds());
        assert_eq!(t.next_step(), None);
    }
}
