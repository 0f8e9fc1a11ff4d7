//! Client side of the backend REST API.
//!
//! ## Architecture
//!
//! - `models`: resource and request/response types
//! - `retry`: bounded exponential backoff for reads
//! - `client`: `reqwest` implementation of [`Backend`]
//!
//! The rest of the crate only talks to the [`Backend`] trait, so tests and
//! alternative transports can stand in for the HTTP client.

mod client;
pub mod models;
mod retry;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpBackend;
pub use models::{
    Application, CheckRequest, Collection, ConflictCheckResult, CreateJobRequest, Device,
    DeviceRef, Job, Owned, Service, Timeslot, TimingRef,
};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// Transport failures and server errors are worth retrying; client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Decode { .. } | ApiError::Encode(_) | ApiError::Client(_) => false,
        }
    }
}

/// Operations the dashboard needs from the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<Application>, ApiError>;

    async fn list_services(&self) -> Result<Vec<Service>, ApiError>;

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError>;

    async fn list_collections(&self) -> Result<Vec<Collection>, ApiError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, ApiError>;

    async fn get_job(&self, uuid: &str) -> Result<Job, ApiError>;

    /// Ask the backend which reservations the requested devices and timings collide with.
    async fn check_job(&self, request: &CheckRequest) -> Result<ConflictCheckResult, ApiError>;

    async fn create_job(&self, request: &CreateJobRequest) -> Result<Job, ApiError>;

    async fn delete_job(&self, uuid: &str) -> Result<(), ApiError>;
}
