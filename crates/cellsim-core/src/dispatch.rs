//! ---
//! sim_section: "05-telemetry-scheduling"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Telemetry scheduling, aggregation, and dispatch."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cellsim_common::config::{CollectorConfig, VnfConfig};
use cellsim_ves::{EventEnvelope, VesEvent};
use parking_lot::Mutex;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::DispatchError;

/// Outbound port toward the measurement collector.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &VesEvent) -> Result<(), DispatchError>;
}

/// Posts `{"event": ...}` documents to the collector with basic auth.
#[derive(Debug, Clone)]
pub struct HttpCollectorDispatcher {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
    source_id: String,
    source_name: String,
}

impl HttpCollectorDispatcher {
    pub fn new(collector: &CollectorConfig, vnf: &VnfConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(collector.request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: collector.url(),
            username: collector.username.clone(),
            password: collector.password.clone(),
            source_id: vnf.source_id.clone(),
            source_name: vnf.source_name.clone(),
        })
    }

    /// Copy of `event` with the deployment's source identity stamped into the header.
    pub fn stamp(&self, event: &VesEvent) -> VesEvent {
        let mut stamped = event.clone();
        stamped.common_event_header.source_id = Some(self.source_id.clone());
        stamped.common_event_header.source_name = Some(self.source_name.clone());
        stamped
    }
}

#[async_trait]
impl EventDispatcher for HttpCollectorDispatcher {
    async fn dispatch(&self, event: &VesEvent) -> Result<(), DispatchError> {
        let envelope = EventEnvelope {
            event: self.stamp(event),
        };
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            debug!(url = %self.url, status = status.as_u16(), "event accepted by collector");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(url = %self.url, status = status.as_u16(), "collector refused event");
        Err(DispatchError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Keeps dispatched events in memory; can be switched to fail every call or to
/// stall on report-ready notifications.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<VesEvent>>,
    failing: AtomicBool,
    notification_delay: Mutex<Duration>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every notification event for `delay` before recording it.
    pub fn set_notification_delay(&self, delay: Duration) {
        *self.notification_delay.lock() = delay;
    }

    pub fn events(&self) -> Vec<VesEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &VesEvent) -> Result<(), DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected("recording dispatcher set to fail".into()));
        }
        let delay = *self.notification_delay.lock();
        if event.notification_fields.is_some() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
