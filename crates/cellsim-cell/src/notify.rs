//! ---
//! sim_section: "03-cell-lifecycle"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Cell lifecycle, directories, and automatic failure transitions."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

pub const CELL_STATUS_TOPIC: &str = "/topic/cellStatus";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub topic: String,
    pub payload: Value,
}

/// Best-effort status broadcast port.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, topic: &str, payload: Value);
}

/// Fans status messages out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<StatusMessage>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StatusNotifier for BroadcastNotifier {
    fn notify(&self, topic: &str, payload: Value) {
        let message = StatusMessage {
            topic: topic.to_owned(),
            payload,
        };
        if self.sender.send(message).is_err() {
            trace!(topic, "status message dropped; no subscribers");
        }
    }
}

/// Keeps every message in memory. Used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<StatusMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().len()
    }
}

impl StatusNotifier for RecordingNotifier {
    fn notify(&self, topic: &str, payload: Value) {
        debug!(topic, "recording status message");
        self.messages.lock().push(StatusMessage {
            topic: topic.to_owned(),
            payload,
        });
    }
}
