use std::collections::BTreeSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::{ApiError, CheckRequest, CreateJobRequest, DeviceRef, TimingRef};
use crate::timing::PendingTimingList;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Please add at least one timing.")]
    NoTimings,
    #[error("No application selected.")]
    NoApplication,
    #[error("Unknown application '{0}'")]
    UnknownApplication(String),
    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),
    #[error("Invalid environment: {0}")]
    Environment(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The in-progress job creation form.
#[derive(Debug, Default)]
pub struct JobForm {
    pub application: Option<String>,
    pub devices: BTreeSet<String>,
    pub timings: PendingTimingList,
    pub environment: Map<String, Value>,
    pub is_public: bool,
}

impl JobForm {
    pub fn new() -> Self {
        Self::default()
    }

    fn device_refs(&self) -> Vec<DeviceRef> {
        self.devices
            .iter()
            .map(|uuid| DeviceRef {
                device_uuid: uuid.clone(),
            })
            .collect()
    }

    fn timing_refs(&self) -> Vec<TimingRef> {
        self.timings
            .as_slice()
            .iter()
            .map(|timing| TimingRef {
                timing: timing.clone(),
            })
            .collect()
    }

    pub fn check_request(&self) -> CheckRequest {
        CheckRequest {
            devices: self.device_refs(),
            timings: self.timing_refs(),
            application: self.application.clone(),
        }
    }

    /// Build the creation body, rejecting forms the backend must never see.
    pub fn create_request(&self, project: Option<&str>) -> Result<CreateJobRequest, SubmissionError> {
        if self.timings.is_empty() {
            return Err(SubmissionError::NoTimings);
        }
        let application = self
            .application
            .clone()
            .ok_or(SubmissionError::NoApplication)?;

        Ok(CreateJobRequest {
            is_public: self.is_public,
            application,
            environment: serde_json::to_string(&self.environment)?,
            devices: self.device_refs(),
            timings: self.timing_refs(),
            created_by_project: project.map(str::to_string),
        })
    }

    /// Reset for the next job. The timing list keeps its observer.
    pub fn clear(&mut self) {
        self.application = None;
        self.devices.clear();
        self.timings.clear();
        self.environment.clear();
        self.is_public = false;
    }
}
