//! Reply types and the single-write response channel

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::outcome::Outcome;

/// Why a workflow failed, for the transport to map onto its own status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Input was missing or violated a business rule
    Validation,
    /// A collaborator call failed
    Operation,
}

/// Failure body: `{ "errfor": {...}, "errors": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    #[serde(skip)]
    pub kind: FailureKind,
    pub errfor: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

impl Failure {
    /// A failure carrying only general errors
    pub fn general(kind: FailureKind, errors: Vec<String>) -> Self {
        Self {
            kind,
            errfor: BTreeMap::new(),
            errors,
        }
    }
}

/// The one value written back for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// The result payload, if one was set
    Success(Option<Value>),
    Failure(Failure),
}

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Success(_) => ReplyKind::Success,
            Reply::Failure(failure) => ReplyKind::Failure(failure.kind),
        }
    }

    /// JSON body as written to the client
    pub fn body(&self) -> Value {
        match self {
            Reply::Success(result) => result.clone().unwrap_or(Value::Null),
            Reply::Failure(failure) => serde_json::json!({
                "errfor": failure.errfor,
                "errors": failure.errors,
            }),
        }
    }
}

/// Summary of what was written, kept by the engine after the reply moves out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Success,
    Failure(FailureKind),
}

/// Errors from writing to a [`Responder`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("a reply was already written to this channel")]
    AlreadySent,

    #[error("the receiving side of the response channel is closed")]
    Closed,
}

/// Receiving half held by the transport
pub type ReplyReceiver = oneshot::Receiver<Reply>;

/// Create a response channel for one request
pub fn response_channel() -> (Responder, ReplyReceiver) {
    let (tx, rx) = oneshot::channel();
    (Responder { tx: Some(tx) }, rx)
}

/// Write-once sending half of a response channel
#[derive(Debug)]
pub struct Responder {
    tx: Option<oneshot::Sender<Reply>>,
}

impl Responder {
    /// True while nothing has been sent and the receiver is still listening
    pub fn is_writable(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// True once a send was attempted, successful or not
    pub fn is_spent(&self) -> bool {
        self.tx.is_none()
    }

    /// Write the reply. Only the first call can ever reach the receiver.
    pub fn send(&mut self, reply: Reply) -> Result<ReplyKind, ResponseError> {
        let tx = self.tx.take().ok_or(ResponseError::AlreadySent)?;
        let kind = reply.kind();
        tx.send(reply).map_err(|_| ResponseError::Closed)?;
        Ok(kind)
    }
}

/// Builds the reply for the terminal "response" step
///
/// Override this to change how an outcome is rendered. The engine still
/// owns the channel, so a custom finalizer cannot write twice.
pub trait Finalize: Send + Sync {
    fn finalize(&self, outcome: Outcome) -> Reply;
}

/// Default finalizer: failure body when errors exist, otherwise the result
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeFinalizer;

impl Finalize for OutcomeFinalizer {
    fn finalize(&self, outcome: Outcome) -> Reply {
        outcome.into_reply()
    }
}
