//! Shared application state

use crate::services::Services;
use crate::uploads::Uploads;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Store and logger handed to every service run
    pub services: Services,
    /// Where multipart uploads are written
    pub uploads: Uploads,
    pub project_name: String,
}

impl AppState {
    pub fn new(services: Services, uploads: Uploads, project_name: impl Into<String>) -> Self {
        Self {
            services,
            uploads,
            project_name: project_name.into(),
        }
    }
}
