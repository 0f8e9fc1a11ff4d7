//! Device eligibility for the job form's device picker.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::api::{Application, Device, Service};

/// Which device predicates are active. A disabled predicate always passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFilterConfig {
    pub ready: bool,
    pub peripherals: bool,
    pub search: bool,
}

impl Default for DeviceFilterConfig {
    fn default() -> Self {
        Self {
            ready: true,
            peripherals: true,
            search: true,
        }
    }
}

/// Peripheral schemas needed by any of the application's services.
pub fn required_peripheral_schemas(
    application: &Application,
    services: &[Service],
) -> BTreeSet<String> {
    application
        .services
        .iter()
        .filter_map(|wrapper| services.iter().find(|s| s.uuid == wrapper.service))
        .flat_map(|service| service.peripherals.iter())
        .map(|p| p.peripheral_schema.clone())
        .collect()
}

#[derive(Debug, Clone)]
pub struct DeviceFilter {
    config: DeviceFilterConfig,
    required: BTreeSet<String>,
    needle: String,
}

impl DeviceFilter {
    pub fn new(
        config: DeviceFilterConfig,
        application: Option<&Application>,
        services: &[Service],
        search: &str,
    ) -> Self {
        Self {
            config,
            required: application
                .map(|app| required_peripheral_schemas(app, services))
                .unwrap_or_default(),
            needle: search.trim().to_lowercase(),
        }
    }

    pub fn is_ready(&self, device: &Device) -> bool {
        !self.config.ready || device.is_ready
    }

    pub fn has_peripherals(&self, device: &Device) -> bool {
        !self.config.peripherals
            || self
                .required
                .iter()
                .all(|schema| device.has_peripheral_schema(schema))
    }

    pub fn matches_search(&self, device: &Device) -> bool {
        !self.config.search
            || self.needle.is_empty()
            || device.device_name.to_lowercase().contains(&self.needle)
            || device.uuid.to_lowercase().contains(&self.needle)
    }

    pub fn matches(&self, device: &Device) -> bool {
        self.is_ready(device) && self.has_peripherals(device) && self.matches_search(device)
    }

    pub fn apply<'a>(&self, devices: &'a [Device]) -> Vec<&'a Device> {
        devices.iter().filter(|d| self.matches(d)).collect()
    }
}
