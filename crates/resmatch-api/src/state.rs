use std::sync::Arc;

use resmatch_jobs::JobService;

use crate::config::ServerConfig;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: JobService,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(service: JobService, config: ServerConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}
