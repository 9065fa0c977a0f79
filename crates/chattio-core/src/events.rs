//! Typed events published from the core to the app shell.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{
    session::SessionStateChange,
    telemetry::TelemetryEvent,
    unread::{NativeNotification, UnreadSummary},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum AppEvent {
    UnreadSummary(UnreadSummary),
    Notification(NativeNotification),
    OpenExternal { platform: String, url: String },
    SessionState(SessionStateChange),
    Telemetry(TelemetryEvent),
}

pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

/// Cheap-to-clone publisher. Publishing never blocks and a closed or absent
/// receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    tx: Option<mpsc::UnboundedSender<AppEvent>>,
}

impl EventBus {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Bus whose events go nowhere.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: AppEvent) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        if tx.send(event).is_err() {
            trace!("event receiver dropped");
        }
    }
}

/// Drains everything currently queued without waiting.
pub fn drain(rx: &mut EventReceiver) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
