//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::time::Duration;

use cellsim_common::config::{ReportingMode, TelemetryConfig};
use cellsim_ves::{bundled_failure_template, bundled_measurement_template, load_template, VesEvent};
use parking_lot::RwLock;
use tracing::info;

use crate::error::Result;

#[derive(Debug, Clone)]
struct Defaults {
    template: VesEvent,
    interval: Duration,
    mode: ReportingMode,
}

/// Process-wide default template, interval and reporting mode, plus the failure template.
///
/// Defaults may be replaced at runtime; schedules already running keep what they started with.
#[derive(Debug)]
pub struct TemplateStore {
    defaults: RwLock<Defaults>,
    failure_template: VesEvent,
    failure_interval: Duration,
}

impl TemplateStore {
    pub fn new(
        template: VesEvent,
        failure_template: VesEvent,
        interval: Duration,
        failure_interval: Duration,
        mode: ReportingMode,
    ) -> Self {
        Self {
            defaults: RwLock::new(Defaults {
                template,
                interval,
                mode,
            }),
            failure_template,
            failure_interval,
        }
    }

    /// Load configured template files, falling back to the bundled documents.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        let template = match &config.template_path {
            Some(path) => {
                info!(path = %path.display(), "loading measurement template");
                load_template(path)?
            }
            None => bundled_measurement_template()?,
        };
        let failure_template = match &config.failure_template_path {
            Some(path) => {
                info!(path = %path.display(), "loading failure template");
                load_template(path)?
            }
            None => bundled_failure_template()?,
        };
        Ok(Self::new(
            template,
            failure_template,
            config.default_interval,
            config.effective_failure_interval(),
            config.reporting_mode,
        ))
    }

    pub fn default_template(&self) -> VesEvent {
        self.defaults.read().template.clone()
    }

    pub fn set_default_template(&self, template: VesEvent) {
        self.defaults.write().template = template;
    }

    pub fn default_interval(&self) -> Duration {
        self.defaults.read().interval
    }

    pub fn set_default_interval(&self, interval: Duration) {
        self.defaults.write().interval = interval;
    }

    pub fn default_mode(&self) -> ReportingMode {
        self.defaults.read().mode
    }

    pub fn set_default_mode(&self, mode: ReportingMode) {
        self.defaults.write().mode = mode;
    }

    pub fn failure_template(&self) -> VesEvent {
        self.failure_template.clone()
    }

    pub fn failure_interval(&self) -> Duration {
        self.failure_interval
    }
}
