use std::sync::Arc;

use crate::api::{ApiError, Backend, HttpBackend};
use crate::config::AppConfig;
use crate::jobs::{CoordinatorSettings, JobCoordinator};
use crate::notifications::NotificationChannel;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn Backend>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self, ApiError> {
        let backend = HttpBackend::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.retry_policy(),
        )?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    pub fn with_backend(config: AppConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    pub fn coordinator(&self, notifier: Arc<dyn NotificationChannel>) -> JobCoordinator {
        let settings = CoordinatorSettings {
            project: self.config.project.clone(),
            device_filter: self.config.device_filter,
        };
        JobCoordinator::new(self.backend.clone(), notifier, settings)
    }
}
