//! Status event stream for front-ends.
//!
//! The engine publishes human-readable [`StatusEvent`]s through an
//! [`EventBus`] backed by a `tokio::sync::broadcast` channel. Any number of
//! front-ends (CLI spinner, GUI log pane, file logger) can subscribe
//! independently. When nobody subscribes, events are dropped.
//!
//! Every event is also mirrored into `tracing` at the matching level, so a
//! run without subscribers still leaves a structured log.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Channel capacity; slow subscribers lag rather than block the engine.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Severity of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One status line emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub severity: Severity,
    pub message: String,
}

/// Broadcast hub for status events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Registers a new subscriber. Only events published after this call are seen.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Returns a publishing handle bound to this bus.
    #[must_use]
    pub fn reporter(&self) -> Reporter {
        Reporter {
            sender: Some(self.sender.clone()),
        }
    }

    fn publish(sender: &broadcast::Sender<StatusEvent>, event: StatusEvent) {
        // `send` only fails when there are no receivers, which is fine.
        let _ = sender.send(event);
    }
}

/// Cheap, cloneable publishing handle passed through the engine.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    sender: Option<broadcast::Sender<StatusEvent>>,
}

impl Reporter {
    /// A reporter that only writes to `tracing`.
    #[must_use]
    pub fn silent() -> Self {
        Self { sender: None }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "scribd_core::status", "{message}");
        self.emit(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "scribd_core::status", "{message}");
        self.emit(Severity::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        error!(target: "scribd_core::status", "{message}");
        self.emit(Severity::Error, message);
    }

    fn emit(&self, severity: Severity, message: String) {
        if let Some(sender) = &self.sender {
            EventBus::publish(sender, StatusEvent { severity, message });
        }
    }
}
