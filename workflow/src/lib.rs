//! Request-processing workflow engine for kts services
//!
//! This crate provides:
//! - An [`Outcome`] accumulator for field errors, general errors and a result
//! - Step dispatch through the [`Workflow`] trait or a dynamic [`StepRegistry`]
//! - A [`WorkflowEngine`] that sequences steps and responds exactly once
//! - The collaborator interfaces services call through ([`DocumentStore`], [`Logger`])
//!
//! # Example
//!
//! ```rust,ignore
//! use kts_workflow::{response_channel, Request, StepRegistry, WorkflowEngine};
//!
//! let (responder, reply) = response_channel();
//! let mut engine = WorkflowEngine::new(StepRegistry::new("greet"), request, (), responder);
//!
//! engine.on("validate", |mut flow| async move {
//!     if flow.request().str_field("name").is_none() {
//!         flow.set_field_error("name", "Required");
//!         return flow.respond();
//!     }
//!     flow.trigger("greet")
//! });
//! engine.on("greet", |mut flow| async move {
//!     flow.set_result(serde_json::json!({ "hello": true }));
//!     flow.respond()
//! });
//!
//! tokio::spawn(engine.run("validate"));
//! let reply = reply.await?;
//! ```

pub mod engine;
pub mod error;
pub mod log;
pub mod outcome;
pub mod registry;
pub mod request;
pub mod response;
pub mod step;
pub mod store;

pub use engine::{Completion, WorkflowEngine};
pub use error::WorkflowError;
pub use log::{Logger, TracingLogger};
pub use outcome::Outcome;
pub use registry::{StepRegistry, Workflow};
pub use request::{Identity, Request};
pub use response::{
    response_channel, Failure, FailureKind, Finalize, OutcomeFinalizer, Reply, ReplyKind,
    ReplyReceiver, Responder, ResponseError,
};
pub use step::{Flow, StepId, Transition};
pub use store::{Document, DocumentStore, Selector, StoreError, Update, ID_FIELD};

/// Re-export async_trait for implementing [`Workflow`] and [`DocumentStore`]
pub use async_trait::async_trait;
