mod channel;
mod log;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::api::ApiError;

pub use channel::ChannelNotifier;
pub use log::LogNotifier;

const FORBIDDEN_MESSAGE: &str = "You are not authorized to do that. Please contact an administrator if you believe this to be a mistake.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Positive,
    Negative,
}

/// One-shot messages surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    JobCreated {
        job_uuid: String,
        application: String,
    },
    JobCreateFailed {
        error: String,
        forbidden: bool,
    },
    JobDeleted {
        job_uuid: String,
    },
    JobDeleteFailed {
        job_uuid: String,
        error: String,
        forbidden: bool,
    },
    LoadFailed {
        resource: &'static str,
        error: String,
        forbidden: bool,
    },
}

impl Notification {
    pub fn create_failed(error: &ApiError) -> Self {
        Self::JobCreateFailed {
            error: error.to_string(),
            forbidden: error.is_forbidden(),
        }
    }

    pub fn delete_failed(job_uuid: &str, error: &ApiError) -> Self {
        Self::JobDeleteFailed {
            job_uuid: job_uuid.to_string(),
            error: error.to_string(),
            forbidden: error.is_forbidden(),
        }
    }

    pub fn load_failed(resource: &'static str, error: &ApiError) -> Self {
        Self::LoadFailed {
            resource,
            error: error.to_string(),
            forbidden: error.is_forbidden(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Notification::JobCreated { .. } | Notification::JobDeleted { .. } => {
                Severity::Positive
            }
            _ => Severity::Negative,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::JobCreated {
                job_uuid,
                application,
            } => format!("Created job {job_uuid} for application {application}"),
            Notification::JobDeleted { job_uuid } => format!("Deleted job {job_uuid}"),
            Notification::JobCreateFailed {
                forbidden: true, ..
            }
            | Notification::JobDeleteFailed {
                forbidden: true, ..
            }
            | Notification::LoadFailed {
                forbidden: true, ..
            } => FORBIDDEN_MESSAGE.to_string(),
            Notification::JobCreateFailed { error, .. } => {
                format!("Could not create job: {error}")
            }
            Notification::JobDeleteFailed {
                job_uuid, error, ..
            } => format!("Could not delete job {job_uuid}: {error}"),
            Notification::LoadFailed {
                resource, error, ..
            } => format!("Could not get {resource}: {error}"),
        }
    }
}

/// Sink for user notifications (log, UI channel, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Default sink: notifications end up in the log.
pub fn create_notifier() -> Arc<dyn NotificationChannel> {
    Arc::new(LogNotifier)
}
