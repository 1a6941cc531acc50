// Typed events published by the notification hub, and the listener seam.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::manager::ListenerRegistry;
use crate::core::alerts::model::Alert;

/// Event published to every listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "alert", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    ShowNotification(Alert),
    HideNotification(Alert),
    ExpandNotification(Alert),
    WaterCompleted(Alert),
}

impl NotificationEvent {
    pub fn alert(&self) -> &Alert {
        match self {
            Self::ShowNotification(alert)
            | Self::HideNotification(alert)
            | Self::ExpandNotification(alert)
            | Self::WaterCompleted(alert) => alert,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShowNotification(_) => "SHOW_NOTIFICATION",
            Self::HideNotification(_) => "HIDE_NOTIFICATION",
            Self::ExpandNotification(_) => "EXPAND_NOTIFICATION",
            Self::WaterCompleted(_) => "WATER_COMPLETED",
        }
    }
}

/// Observer registered with the hub.
///
/// Called outside the hub's lock, so a listener may call back into the hub.
pub trait NotificationListener: Send + Sync {
    fn notify(&self, event: &NotificationEvent);
}

impl<F> NotificationListener for F
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn notify(&self, event: &NotificationEvent) {
        self(event)
    }
}

/// Channel form: forwards each event to a receiver task.
pub struct ChannelListener(mpsc::UnboundedSender<NotificationEvent>);

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }
}

impl NotificationListener for ChannelListener {
    fn notify(&self, event: &NotificationEvent) {
        if self.0.send(event.clone()).is_err() {
            log::debug!("Notification receiver gone, dropping {}", event.kind());
        }
    }
}

pub(crate) type ListenerId = u64;

/// Handle returned by `add_listener`. `unsubscribe` removes exactly the
/// listener it was issued for.
#[must_use = "dropping the subscription keeps the listener registered; call unsubscribe to remove it"]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Returns false if the listener was already gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }
}
