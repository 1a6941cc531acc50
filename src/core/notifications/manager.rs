// Notification hub: owns the single active notification and fans events
// out to listeners (the presentation layer plus any diagnostics).
//
// There is no queue. Triggering while a notification is active replaces it:
// HIDE(old) is published before SHOW(new) so the presentation layer can
// reset cleanly first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::events::{ListenerId, NotificationEvent, NotificationListener, Subscription};
use crate::core::alerts::model::{Alert, AlertCategory, SIMULATED_ALERT_ID};
use crate::core::alerts::store::AlertStore;
use crate::core::clock::Clock;
use crate::core::error::AlertResult;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn NotificationListener>)>>,
}

impl ListenerRegistry {
    fn lock(&self) -> MutexGuard<'_, Vec<(ListenerId, Arc<dyn NotificationListener>)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn add(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<dyn NotificationListener>> {
        self.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Active notification plus a counter bumped on every change, so a caller
/// that published outside the lock can tell whether it was overtaken.
#[derive(Default)]
struct ActiveSlot {
    alert: Option<Alert>,
    generation: u64,
}

impl ActiveSlot {
    fn snapshot(&self) -> Option<(Alert, u64)> {
        self.alert.clone().map(|alert| (alert, self.generation))
    }

    fn replace(&mut self, alert: Option<Alert>) {
        self.alert = alert;
        self.generation += 1;
    }
}

pub struct NotificationManager {
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
    listeners: Arc<ListenerRegistry>,
    active: Mutex<ActiveSlot>,
}

impl NotificationManager {
    pub fn new(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            listeners: Arc::new(ListenerRegistry::default()),
            active: Mutex::new(ActiveSlot::default()),
        }
    }

    fn active_slot(&self) -> MutexGuard<'_, ActiveSlot> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a listener for every published event.
    pub fn add_listener<L: NotificationListener + 'static>(&self, listener: L) -> Subscription {
        let id = self.listeners.add(Arc::new(listener));
        Subscription::new(id, &self.listeners)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn publish(&self, event: NotificationEvent) {
        log::debug!("Publishing {} for alert {}", event.kind(), event.alert().id);
        // Snapshot first: listeners may re-enter the hub.
        for listener in self.listeners.snapshot() {
            listener.notify(&event);
        }
    }

    /// Show `alert` immediately, replacing any active notification.
    ///
    /// If a listener changes the active notification while HIDE(old) is
    /// being published, that later change wins and `alert` is dropped.
    fn present(&self, alert: Alert) -> bool {
        let (previous, generation) = {
            let slot = self.active_slot();
            (slot.alert.clone(), slot.generation)
        };
        if let Some(old) = previous {
            log::debug!("Replacing active notification {} with {}", old.id, alert.id);
            self.publish(NotificationEvent::HideNotification(old));
        }
        {
            let mut slot = self.active_slot();
            if slot.generation != generation {
                log::debug!("Notification {} superseded during replacement", alert.id);
                return false;
            }
            slot.replace(Some(alert.clone()));
        }
        log::info!("Showing notification for alert {} ({:?})", alert.id, alert.category);
        self.publish(NotificationEvent::ShowNotification(alert));
        true
    }

    /// Publish HIDE for the notification activated at `generation`, then
    /// clear it unless something newer took its place meanwhile.
    fn dismiss_if(&self, generation: u64) -> bool {
        let current = self.active_slot().snapshot();
        let alert = match current {
            Some((alert, current_generation)) if current_generation == generation => alert,
            _ => return false,
        };
        self.publish(NotificationEvent::HideNotification(alert));
        let mut slot = self.active_slot();
        if slot.generation == generation {
            slot.replace(None);
        }
        true
    }

    /// Make `alert` the active notification and record the firing in the store.
    ///
    /// The SHOW event is published before the store round-trip; a store
    /// failure is returned to the caller but never retracts the event.
    pub async fn trigger_notification(&self, alert: Alert) -> AlertResult<()> {
        let id = alert.id;
        self.present(alert);
        if let Err(e) = self.store.mark_alert_triggered(id).await {
            log::warn!("Failed to record trigger for alert {}: {}", id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Hide the active notification. Returns false when nothing was active.
    /// HIDE is published while the alert is still active.
    pub fn dismiss_notification(&self) -> bool {
        let current = self.active_slot().snapshot();
        match current {
            Some((_, generation)) => self.dismiss_if(generation),
            None => false,
        }
    }

    /// Ask the presentation layer to go full screen. Active state is unchanged.
    pub fn expand_notification(&self) -> bool {
        let current = self.active_notification();
        match current {
            Some(alert) => {
                self.publish(NotificationEvent::ExpandNotification(alert));
                true
            }
            None => false,
        }
    }

    /// Complete an active water reminder, then dismiss it.
    /// Any other category (or nothing active) is a no-op.
    pub fn complete_water_reminder(&self) -> bool {
        let current = self.active_slot().snapshot();
        match current {
            Some((alert, generation)) if alert.is_water() => {
                self.publish(NotificationEvent::WaterCompleted(alert));
                self.dismiss_if(generation);
                true
            }
            _ => false,
        }
    }

    pub fn active_notification(&self) -> Option<Alert> {
        self.active_slot().alert.clone()
    }

    /// Show a synthetic water reminder. It has no store record, so no
    /// trigger bookkeeping happens.
    pub fn simulate_water_reminder(&self) -> bool {
        let now = self.clock.now();
        let alert = Alert::daily(
            SIMULATED_ALERT_ID,
            AlertCategory::Water,
            "Time to drink water! Stay hydrated",
            now.format("%H:%M").to_string(),
        );
        self.present(alert)
    }
}
