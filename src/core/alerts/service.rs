//! Alert management use-cases.
//!
//! Wraps the record store and keeps the scheduler's watch set in step with
//! every create, edit, toggle and delete. Callers should go through this
//! service rather than mutating the store directly, otherwise watches drift.

use std::sync::Arc;

use super::model::{Alert, AlertId, AlertPatch, NewAlert};
use super::store::AlertStore;
use crate::core::error::AlertResult;
use crate::core::notifications::scheduler::{NotificationScheduler, WatchHandle};

pub struct AlertService {
    store: Arc<dyn AlertStore>,
    scheduler: Arc<NotificationScheduler>,
}

impl AlertService {
    pub fn new(store: Arc<dyn AlertStore>, scheduler: Arc<NotificationScheduler>) -> Self {
        Self { store, scheduler }
    }

    fn sync_watch(&self, alert: &Alert) {
        if alert.enabled {
            self.scheduler.schedule_alert(alert.clone());
        } else {
            self.scheduler.cancel_alert(alert.id);
        }
    }

    /// Create an alert; enabled alerts are scheduled straight away.
    pub async fn add_alert(&self, new_alert: NewAlert) -> AlertResult<Alert> {
        let alert = self.store.add_alert(new_alert).await?;
        self.sync_watch(&alert);
        Ok(alert)
    }

    pub async fn update_alert(&self, id: AlertId, patch: AlertPatch) -> AlertResult<Alert> {
        let alert = self.store.update_alert(id, patch).await?;
        self.sync_watch(&alert);
        Ok(alert)
    }

    pub async fn toggle_alert(&self, id: AlertId) -> AlertResult<Alert> {
        let alert = self.store.toggle_alert(id).await?;
        self.sync_watch(&alert);
        Ok(alert)
    }

    /// Delete from the store and drop its watch.
    ///
    /// # Errors
    /// `NotFound` when the store has no such alert; the watch is dropped
    /// regardless.
    pub async fn delete_alert(&self, id: AlertId) -> AlertResult<Alert> {
        self.scheduler.cancel_alert(id);
        self.store.delete_alert(id).await
    }

    /// Rebuild the whole watch set from the store's enabled alerts.
    pub async fn reload(&self) -> AlertResult<Vec<WatchHandle>> {
        let alerts = self.store.get_active_alerts().await?;
        Ok(self.scheduler.schedule_all_alerts(alerts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::AlertCategory;
    use crate::core::alerts::store::JsonAlertStore;
    use crate::core::clock::ManualClock;
    use crate::core::notifications::manager::NotificationManager;
    use chrono::NaiveDate;

    fn service() -> (Arc<JsonAlertStore>, Arc<NotificationScheduler>, AlertService) {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(7, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(JsonAlertStore::in_memory(clock.clone()));
        let manager = Arc::new(NotificationManager::new(store.clone(), clock.clone()));
        let scheduler = Arc::new(NotificationScheduler::new(manager, store.clone(), clock));
        let service = AlertService::new(store.clone(), scheduler.clone());
        (store, scheduler, service)
    }

    #[tokio::test]
    async fn test_add_schedules_only_enabled() {
        let (_, scheduler, service) = service();
        let on = service.add_alert(NewAlert::new(AlertCategory::Water, "Water").at("08:00")).await.unwrap();
        let off = service
            .add_alert(NewAlert::new(AlertCategory::Sleep, "Bed").at("22:00").enabled(false))
            .await
            .unwrap();
        assert!(scheduler.is_watching(on.id));
        assert!(!scheduler.is_watching(off.id));
    }

    #[tokio::test]
    async fn test_toggle_and_update_follow_enabled_flag() {
        let (_, scheduler, service) = service();
        let alert = service.add_alert(NewAlert::new(AlertCategory::Meal, "Lunch").at("12:00")).await.unwrap();

        service.toggle_alert(alert.id).await.unwrap();
        assert!(!scheduler.is_watching(alert.id));

        service.update_alert(alert.id, AlertPatch::enabled(true)).await.unwrap();
        assert!(scheduler.is_watching(alert.id));

        let moved = service
            .update_alert(alert.id, AlertPatch { time: Some("12:30".into()), ..AlertPatch::default() })
            .await
            .unwrap();
        assert_eq!(scheduler.scheduled_alerts()[0].time, moved.time);
        assert_eq!(scheduler.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_unschedules() {
        let (store, scheduler, service) = service();
        let alert = service.add_alert(NewAlert::new(AlertCategory::Water, "Water").at("08:00")).await.unwrap();

        service.delete_alert(alert.id).await.unwrap();
        assert!(!scheduler.is_watching(alert.id));
        assert!(store.get_alert(alert.id).await.unwrap_err().is_not_found());
        assert!(service.delete_alert(alert.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reload_matches_active_alerts() {
        let (store, scheduler, service) = service();
        store.create_sample_alerts().unwrap();
        let handles = service.reload().await.unwrap();
        assert_eq!(handles.len(), 3);
        assert_eq!(scheduler.watch_count(), 3);
    }
}
