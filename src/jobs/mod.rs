//! Job submission coordination.
//!
//! The coordinator owns the job form, the loaded catalog (applications,
//! services, devices, collections) and the job list. It asks the backend for
//! conflicts whenever the device selection changes, and submits the form.
//!
//! Conflict checks are advisory. They may overlap, so each one is tagged with
//! a generation number and a response older than the newest applied one is
//! discarded.

mod filter;
mod form;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::{
    ApiError, Application, Backend, CheckRequest, Collection, ConflictCheckResult, Device, Job,
    Service,
};
use crate::notifications::{Notification, NotificationChannel};

pub use filter::{DeviceFilter, DeviceFilterConfig, required_peripheral_schemas};
pub use form::{JobForm, SubmissionError};

/// Backend data the form picks from.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub applications: Vec<Application>,
    pub services: Vec<Service>,
    pub devices: Vec<Device>,
    pub collections: Vec<Collection>,
}

impl Catalog {
    pub fn application(&self, uuid: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.uuid == uuid)
    }

    pub fn collection(&self, uuid: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.uuid == uuid)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoordinatorSettings {
    /// Sent as `created_by_project` on job creation.
    pub project: Option<String>,
    pub device_filter: DeviceFilterConfig,
}

/// What happened to a conflict-check response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Applied(ConflictCheckResult),
    /// A newer check had already been applied; this response was dropped.
    Stale { generation: u64, latest: u64 },
}

#[derive(Debug, Default)]
struct CoordinatorState {
    form: JobForm,
    jobs: Vec<Job>,
    catalog: Catalog,
    conflicts: Option<ConflictCheckResult>,
    applied_generation: u64,
    load_errors: BTreeMap<&'static str, String>,
}

#[derive(Clone)]
pub struct JobCoordinator {
    backend: Arc<dyn Backend>,
    notifier: Arc<dyn NotificationChannel>,
    settings: Arc<CoordinatorSettings>,
    state: Arc<RwLock<CoordinatorState>>,
    generation: Arc<AtomicU64>,
}

impl JobCoordinator {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn NotificationChannel>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self::with_form(backend, notifier, settings, JobForm::new())
    }

    /// Start from a prepared form, e.g. one whose timing list has an observer.
    pub fn with_form(
        backend: Arc<dyn Backend>,
        notifier: Arc<dyn NotificationChannel>,
        settings: CoordinatorSettings,
        form: JobForm,
    ) -> Self {
        Self {
            backend,
            notifier,
            settings: Arc::new(settings),
            state: Arc::new(RwLock::new(CoordinatorState {
                form,
                ..Default::default()
            })),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fetch every list the form depends on. A failing list is recorded as a
    /// load error; the others still load.
    pub async fn load(&self) -> BTreeMap<&'static str, String> {
        let (jobs, applications, services, devices, collections) = tokio::join!(
            self.backend.list_jobs(),
            self.backend.list_applications(),
            self.backend.list_services(),
            self.backend.list_devices(),
            self.backend.list_collections(),
        );

        let mut failures: Vec<(&'static str, ApiError)> = Vec::new();
        let mut state = self.state.write().await;
        state.load_errors.clear();

        match jobs {
            Ok(v) => state.jobs = v,
            Err(e) => failures.push(("jobs", e)),
        }
        match applications {
            Ok(v) => state.catalog.applications = v,
            Err(e) => failures.push(("applications", e)),
        }
        match services {
            Ok(v) => state.catalog.services = v,
            Err(e) => failures.push(("services", e)),
        }
        match devices {
            Ok(v) => state.catalog.devices = v,
            Err(e) => failures.push(("devices", e)),
        }
        match collections {
            Ok(v) => state.catalog.collections = v,
            Err(e) => failures.push(("collections", e)),
        }

        for (resource, error) in &failures {
            warn!(resource = *resource, error = %error, "Failed to load");
            state.load_errors.insert(*resource, error.to_string());
        }
        let errors = state.load_errors.clone();
        drop(state);

        for (resource, error) in &failures {
            if error.is_forbidden() {
                self.emit(Notification::load_failed(*resource, error)).await;
            }
        }

        info!(failed = errors.len(), "Dashboard data loaded");
        errors
    }

    /// Run a conflict check for `request` and apply the result unless a newer
    /// check already landed. Failures leave the previous result in place.
    pub async fn check_conflicts(&self, request: CheckRequest) -> Result<CheckOutcome, ApiError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            generation,
            devices = request.devices.len(),
            timings = request.timings.len(),
            "Checking conflicts"
        );

        let result = match self.backend.check_job(&request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(generation, error = %e, "Conflict check failed, keeping last result");
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if generation < state.applied_generation {
            debug!(
                generation,
                latest = state.applied_generation,
                "Discarding stale conflict check"
            );
            return Ok(CheckOutcome::Stale {
                generation,
                latest: state.applied_generation,
            });
        }

        if result.has_conflicts() {
            info!(devices = ?result.conflicting_devices(), "Conflicts found");
        }
        state.applied_generation = generation;
        state.conflicts = Some(result.clone());
        Ok(CheckOutcome::Applied(result))
    }

    /// Conflict check for the form as it currently stands.
    pub async fn check_form(&self) -> Result<CheckOutcome, ApiError> {
        let request = self.state.read().await.form.check_request();
        self.check_conflicts(request).await
    }

    /// Replace the device selection and re-run the conflict check.
    ///
    /// Returns `None` when the check failed; the failure is already logged.
    pub async fn select_devices<I>(&self, devices: I) -> Option<CheckOutcome>
    where
        I: IntoIterator<Item = String>,
    {
        {
            let mut state = self.state.write().await;
            state.form.devices = devices.into_iter().collect();
        }
        self.check_form().await.ok()
    }

    /// Use a saved collection's devices as the selection.
    pub async fn select_collection(
        &self,
        uuid: &str,
    ) -> Result<Option<CheckOutcome>, SubmissionError> {
        let devices: Vec<String> = {
            let state = self.state.read().await;
            let collection = state
                .catalog
                .collection(uuid)
                .ok_or_else(|| SubmissionError::UnknownCollection(uuid.to_string()))?;
            collection
                .devices
                .iter()
                .map(|d| d.device_uuid.clone())
                .collect()
        };
        Ok(self.select_devices(devices).await)
    }

    /// Choose the application and seed the form environment from its defaults.
    pub async fn select_application(&self, uuid: &str) -> Result<(), SubmissionError> {
        let mut state = self.state.write().await;
        let environment = state
            .catalog
            .application(uuid)
            .ok_or_else(|| SubmissionError::UnknownApplication(uuid.to_string()))?
            .parsed_environment()?;

        state.form.application = Some(uuid.to_string());
        state.form.environment = environment;
        Ok(())
    }

    /// Devices the picker should offer for the selected application.
    pub async fn eligible_devices(&self, search: &str) -> Vec<Device> {
        let state = self.state.read().await;
        let application = state
            .form
            .application
            .as_deref()
            .and_then(|uuid| state.catalog.application(uuid));
        let filter = DeviceFilter::new(
            self.settings.device_filter,
            application,
            &state.catalog.services,
            search,
        );
        filter
            .apply(&state.catalog.devices)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Submit the form. Validation failures never reach the backend; backend
    /// failures leave the form as it was.
    pub async fn submit(&self) -> Result<Job, SubmissionError> {
        let request = self
            .state
            .read()
            .await
            .form
            .create_request(self.settings.project.as_deref())?;

        match self.backend.create_job(&request).await {
            Ok(job) => {
                {
                    let mut state = self.state.write().await;
                    state.jobs.insert(0, job.clone());
                    state.form.clear();
                    state.conflicts = None;
                    // Checks still in flight belong to the old form
                    state.applied_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                }
                info!(job = %job.uuid, application = %job.application, "Job created");
                self.emit(Notification::JobCreated {
                    job_uuid: job.uuid.clone(),
                    application: job.application.clone(),
                })
                .await;
                Ok(job)
            }
            Err(e) => {
                warn!(error = %e, "Job creation failed");
                self.emit(Notification::create_failed(&e)).await;
                Err(e.into())
            }
        }
    }

    pub async fn delete_job(&self, uuid: &str) -> Result<(), ApiError> {
        match self.backend.delete_job(uuid).await {
            Ok(()) => {
                self.state.write().await.jobs.retain(|j| j.uuid != uuid);
                info!(job = uuid, "Job deleted");
                self.emit(Notification::JobDeleted {
                    job_uuid: uuid.to_string(),
                })
                .await;
                Ok(())
            }
            Err(e) => {
                warn!(job = uuid, error = %e, "Job deletion failed");
                self.emit(Notification::delete_failed(uuid, &e)).await;
                Err(e)
            }
        }
    }

    /// Mutate the form in place.
    pub async fn update_form<R>(&self, f: impl FnOnce(&mut JobForm) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state.form)
    }

    /// Read from the form without cloning it.
    pub async fn inspect_form<R>(&self, f: impl FnOnce(&JobForm) -> R) -> R {
        let state = self.state.read().await;
        f(&state.form)
    }

    pub async fn conflicts(&self) -> Option<ConflictCheckResult> {
        self.state.read().await.conflicts.clone()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.read().await.jobs.clone()
    }

    pub async fn catalog(&self) -> Catalog {
        self.state.read().await.catalog.clone()
    }

    pub async fn load_errors(&self) -> BTreeMap<&'static str, String> {
        self.state.read().await.load_errors.clone()
    }

    async fn emit(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}
