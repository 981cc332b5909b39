//! Logger interface for defects and collaborator failures

use std::error::Error;

/// Sink for errors that must be recorded but never shown to the client
pub trait Logger: Send + Sync {
    fn error(&self, message: &str, err: &(dyn Error + 'static));
}

/// Forwards to `tracing::error!`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, message: &str, err: &(dyn Error + 'static)) {
        tracing::error!(error = %err, "{}", message);
    }
}
