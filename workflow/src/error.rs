//! Protocol defects detected by the engine

/// Defects in how a workflow was wired or driven.
///
/// These never reach the client. The engine logs them and absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow '{workflow}' triggered unregistered step {step}")]
    UnregisteredStep { workflow: String, step: String },

    #[error("workflow '{workflow}' already responded")]
    AlreadyResponded { workflow: String },
}
