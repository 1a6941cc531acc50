// Notification scheduler: one consolidated poll loop over every watched alert.
//
// Each watch owns a next-check time in a min-heap. A tick pops every due
// entry, evaluates its alert once, and pushes it back at
// min(now + poll interval, start of its next target minute). Cancelled or
// replaced watches leave stale heap entries behind; they are recognised by
// their generation and dropped when popped.
//
// Deadlines are local wall-clock times. A deadline more than one poll period
// ahead can only come from local time moving backwards, so a tick pulls such
// watches back to `now` before evaluating.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tokio::sync::Notify;

use super::manager::NotificationManager;
use crate::core::alerts::model::{Alert, AlertId, AlertPatch, Recurrence};
use crate::core::alerts::store::AlertStore;
use crate::core::alerts::triggers::{self, DEFAULT_DEBOUNCE_SECS};
use crate::core::clock::Clock;
use crate::core::error::AlertResult;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Opaque handle for an installed watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle {
    pub alert_id: AlertId,
    generation: u64,
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}-{}", self.alert_id, self.generation)
    }
}

/// Live binding between an alert and the poll loop
#[derive(Debug, Clone)]
struct ScheduledWatch {
    handle: WatchHandle,
    /// Scheduler-owned copy; debounce and one-shot state live here
    alert: Alert,
    next_check: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    due: NaiveDateTime,
    alert_id: AlertId,
    generation: u64,
}

#[derive(Default)]
struct SchedulerState {
    watches: HashMap<AlertId, ScheduledWatch>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    next_generation: u64,
}

impl SchedulerState {
    fn is_current(&self, entry: &HeapEntry) -> bool {
        self.watches
            .get(&entry.alert_id)
            .is_some_and(|w| w.handle.generation == entry.generation)
    }

    fn entry(watch: &ScheduledWatch) -> Reverse<HeapEntry> {
        Reverse(HeapEntry {
            due: watch.next_check,
            alert_id: watch.handle.alert_id,
            generation: watch.handle.generation,
        })
    }

    fn push(&mut self, watch: &ScheduledWatch) {
        self.heap.push(Self::entry(watch));
    }

    /// Move every deadline later than `horizon` back to `now` and rebuild
    /// the heap. Returns how many watches moved.
    fn rekey_beyond(&mut self, horizon: NaiveDateTime, now: NaiveDateTime) -> usize {
        let mut moved = 0;
        for watch in self.watches.values_mut() {
            if watch.next_check > horizon {
                watch.next_check = now;
                moved += 1;
            }
        }
        if moved > 0 {
            self.heap = self.watches.values().map(Self::entry).collect();
        }
        moved
    }

    fn reset(&mut self) -> usize {
        let count = self.watches.len();
        self.watches.clear();
        self.heap.clear();
        count
    }

    /// Earliest live deadline, discarding stale heap tops on the way.
    fn next_due(&mut self) -> Option<NaiveDateTime> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_current(top) {
                return Some(top.due);
            }
            self.heap.pop();
        }
        None
    }
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub fired: Vec<AlertId>,
    pub malformed: Vec<AlertId>,
}

pub struct NotificationScheduler {
    manager: Arc<NotificationManager>,
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    debounce: TimeDelta,
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl NotificationScheduler {
    pub fn new(manager: Arc<NotificationManager>, store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            manager,
            store,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: TimeDelta::seconds(DEFAULT_DEBOUNCE_SECS),
            state: Mutex::new(SchedulerState::default()),
            wake: Notify::new(),
        }
    }

    /// Poll period. Zero is bumped to one second, anything over a minute
    /// is capped so a target minute can never be skipped.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(Duration::from_secs(1), Duration::from_secs(60));
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = TimeDelta::from_std(debounce).unwrap_or(TimeDelta::seconds(DEFAULT_DEBOUNCE_SECS));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn poll_step(&self) -> TimeDelta {
        TimeDelta::from_std(self.poll_interval).unwrap_or(TimeDelta::seconds(30))
    }

    /// When a watch should next be looked at, never later than one poll
    /// period and never before the start of its next target minute.
    fn next_check_after(&self, alert: &Alert, now: NaiveDateTime) -> NaiveDateTime {
        let by_poll = now + self.poll_step();
        match triggers::next_occurrence(alert, now) {
            Ok(Some(next)) if next < by_poll => next,
            _ => by_poll,
        }
    }

    fn install(&self, state: &mut SchedulerState, alert: Alert, now: NaiveDateTime) -> Option<WatchHandle> {
        if state.watches.remove(&alert.id).is_some() {
            log::debug!("Replacing existing watch for alert {}", alert.id);
        }
        if triggers::is_expired(&alert, now).unwrap_or(false) {
            log::debug!("Not watching alert {}: its one-shot slot has passed", alert.id);
            return None;
        }
        state.next_generation += 1;
        let handle = WatchHandle {
            alert_id: alert.id,
            generation: state.next_generation,
        };
        let watch = ScheduledWatch {
            handle,
            next_check: self.next_check_after(&alert, now),
            alert,
        };
        state.push(&watch);
        state.watches.insert(handle.alert_id, watch);
        Some(handle)
    }

    /// Register or re-register a watch for `alert`. Any previous watch for
    /// the same id is cancelled first. Returns `None` for a one-shot alert
    /// whose slot has already passed.
    pub fn schedule_alert(&self, alert: Alert) -> Option<WatchHandle> {
        let now = self.clock.now();
        let handle = {
            let mut state = self.lock();
            self.install(&mut state, alert, now)
        };
        if let Some(handle) = handle {
            log::debug!("Scheduled {}", handle);
        }
        self.wake.notify_one();
        handle
    }

    /// Stop watching `alert_id`. Nothing to cancel is not an error.
    pub fn cancel_alert(&self, alert_id: AlertId) -> bool {
        let removed = self.lock().watches.remove(&alert_id).is_some();
        if removed {
            log::debug!("Cancelled watch for alert {}", alert_id);
            self.wake.notify_one();
        }
        removed
    }

    /// Replace the whole watch set with the enabled alerts in `alerts`.
    pub fn schedule_all_alerts(&self, alerts: impl IntoIterator<Item = Alert>) -> Vec<WatchHandle> {
        let now = self.clock.now();
        let handles: Vec<WatchHandle> = {
            let mut state = self.lock();
            state.reset();
            alerts
                .into_iter()
                .filter(|a| a.enabled)
                .filter_map(|a| self.install(&mut state, a, now))
                .collect()
        };
        log::info!("Scheduled {} alerts", handles.len());
        self.wake.notify_one();
        handles
    }

    /// Drop every watch without rescheduling.
    pub fn clear_all_notifications(&self) {
        let count = self.lock().reset();
        log::debug!("Cleared {} watches", count);
        self.wake.notify_one();
    }

    pub fn watch_count(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn is_watching(&self, alert_id: AlertId) -> bool {
        self.lock().watches.contains_key(&alert_id)
    }

    /// Scheduler-side snapshots of every watched alert
    pub fn scheduled_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.lock().watches.values().map(|w| w.alert.clone()).collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    /// Fire `alert` through the hub right away, bypassing time matching.
    pub async fn simulate_notification(&self, alert: Alert) -> AlertResult<()> {
        self.manager.trigger_notification(alert).await
    }

    /// Evaluate every watch whose check time has come.
    ///
    /// Malformed alerts are logged and skipped; their watch stays installed
    /// so a later edit can fix them.
    pub async fn tick(&self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();
        let mut to_fire = Vec::new();

        {
            let mut state = self.lock();
            let moved = state.rekey_beyond(now + self.poll_step(), now);
            if moved > 0 {
                log::warn!("Local time moved backwards to {}; rechecking {} watches", now, moved);
            }
            while let Some(Reverse(top)) = state.heap.peek() {
                if top.due > now {
                    break;
                }
                let Some(Reverse(entry)) = state.heap.pop() else {
                    break;
                };
                if !state.is_current(&entry) {
                    continue;
                }
                let Some(watch) = state.watches.get_mut(&entry.alert_id) else {
                    continue;
                };

                report.evaluated += 1;
                match triggers::should_fire(&mut watch.alert, now, self.debounce) {
                    Ok(true) => {
                        report.fired.push(watch.alert.id);
                        to_fire.push(watch.alert.clone());
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!("Skipping alert {}: {}", entry.alert_id, e);
                        report.malformed.push(entry.alert_id);
                    }
                }

                let consumed = watch.alert.recurrence == Recurrence::Once
                    && (!watch.alert.enabled || triggers::is_expired(&watch.alert, now).unwrap_or(false));
                if consumed {
                    state.watches.remove(&entry.alert_id);
                } else {
                    watch.next_check = self.next_check_after(&watch.alert, now);
                    let watch = watch.clone();
                    state.push(&watch);
                }
            }
        }

        for alert in to_fire {
            let id = alert.id;
            let one_shot = alert.recurrence == Recurrence::Once;
            log::info!("Alert {} fired: {}", id, alert.message);
            if let Err(e) = self.manager.trigger_notification(alert).await {
                log::warn!("Alert {} shown but not recorded: {}", id, e);
            }
            if one_shot {
                if let Err(e) = self.store.update_alert(id, AlertPatch::enabled(false)).await {
                    log::warn!("Failed to disable one-shot alert {}: {}", id, e);
                }
            }
        }

        report
    }

    /// How long the loop may sleep before the next due watch.
    fn sleep_budget(&self, now: NaiveDateTime) -> Duration {
        let next_due = self.lock().next_due();
        match next_due {
            Some(due) => due
                .signed_duration_since(now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.poll_interval),
            None => self.poll_interval,
        }
    }

    /// Drive the poll loop until `shutdown` resolves, then drop all watches.
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::pin!(shutdown);
        log::info!("Notification scheduler started (poll every {:?})", self.poll_interval);

        loop {
            let now = self.clock.now();
            let report = self.tick(now).await;
            if !report.fired.is_empty() {
                log::debug!("Tick at {} fired {:?}", now, report.fired);
            }

            let budget = self.sleep_budget(self.clock.now());
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(budget) => {}
            }
        }

        self.clear_all_notifications();
        log::info!("Notification scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertCategory, NewAlert};
    use crate::core::alerts::store::JsonAlertStore;
    use crate::core::clock::ManualClock;
    use crate::core::notifications::events::NotificationEvent;
    use chrono::NaiveDate;

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<JsonAlertStore>,
        manager: Arc<NotificationManager>,
        scheduler: NotificationScheduler,
        shown: Arc<Mutex<Vec<AlertId>>>,
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn harness(start: NaiveDateTime) -> Harness {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(JsonAlertStore::in_memory(clock.clone()));
        let manager = Arc::new(NotificationManager::new(store.clone(), clock.clone()));
        let shown: Arc<Mutex<Vec<AlertId>>> = Arc::default();
        let sink = shown.clone();
        let _s = manager.add_listener(move |event: &NotificationEvent| {
            if let NotificationEvent::ShowNotification(alert) = event {
                sink.lock().unwrap().push(alert.id);
            }
        });
        let scheduler = NotificationScheduler::new(manager.clone(), store.clone(), clock.clone());
        Harness {
            clock,
            store,
            manager,
            scheduler,
            shown,
        }
    }

    impl Harness {
        async fn add(&self, new_alert: NewAlert) -> Alert {
            self.store.add_alert(new_alert).await.unwrap()
        }

        async fn tick_at(&self, now: NaiveDateTime) -> TickReport {
            self.clock.set(now);
            self.scheduler.tick(now).await
        }

        fn shown(&self) -> Vec<AlertId> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_daily_alert_fires_at_minute_start() {
        let h = harness(at(1, 7, 59, 45));
        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("08:00")).await;
        h.scheduler.schedule_alert(alert.clone());

        // next check is pulled forward to 08:00:00, not 08:00:15
        assert_eq!(h.tick_at(at(1, 7, 59, 59)).await.evaluated, 0);
        let report = h.tick_at(at(1, 8, 0, 0)).await;
        assert_eq!(report.fired, vec![alert.id]);
        assert_eq!(h.shown(), vec![alert.id]);
        assert_eq!(h.manager.active_notification().map(|a| a.id), Some(alert.id));
        assert!(h.store.get_alert(alert.id).await.unwrap().last_triggered.is_some());
    }

    #[tokio::test]
    async fn test_same_minute_polls_are_debounced() {
        let h = harness(at(1, 9, 59, 0));
        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("10:00")).await;
        h.scheduler.schedule_alert(alert.clone());

        assert_eq!(h.tick_at(at(1, 10, 0, 0)).await.fired, vec![alert.id]);
        let second = h.tick_at(at(1, 10, 0, 30)).await;
        assert_eq!(second.evaluated, 1);
        assert!(second.fired.is_empty());
        assert_eq!(h.shown(), vec![alert.id]);
    }

    #[tokio::test]
    async fn test_each_due_watch_evaluated_once_per_tick() {
        let h = harness(at(1, 12, 0, 0));
        for time in ["06:00", "07:00", "08:00"] {
            let alert = h.add(NewAlert::new(AlertCategory::Meal, "Eat").at(time)).await;
            h.scheduler.schedule_alert(alert);
        }
        let report = h.tick_at(at(1, 12, 0, 30)).await;
        assert_eq!(report.evaluated, 3);
        let report = h.tick_at(at(1, 12, 0, 45)).await;
        assert_eq!(report.evaluated, 0);
    }

    #[tokio::test]
    async fn test_one_shot_removes_watch_and_persists_disable() {
        let h = harness(at(1, 8, 59, 30));
        let alert = h
            .add(NewAlert::new(AlertCategory::Medication, "Doctor").at("09:00").once_on("2024-06-01"))
            .await;
        h.scheduler.schedule_alert(alert.clone());

        assert_eq!(h.tick_at(at(1, 9, 0, 0)).await.fired, vec![alert.id]);
        assert!(!h.scheduler.is_watching(alert.id));
        assert!(!h.store.get_alert(alert.id).await.unwrap().enabled);

        assert_eq!(h.tick_at(at(1, 9, 0, 30)).await.evaluated, 0);
        assert_eq!(h.shown(), vec![alert.id]);
    }

    #[tokio::test]
    async fn test_clock_moving_back_rechecks_watches() {
        let h = harness(at(1, 10, 0, 0));
        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("07:30")).await;
        h.scheduler.schedule_alert(alert.clone());

        // local time jumps back two and a half hours
        let report = h.tick_at(at(1, 7, 29, 50)).await;
        assert_eq!(report.evaluated, 1);
        assert!(report.fired.is_empty());

        assert_eq!(h.tick_at(at(1, 7, 30, 10)).await.fired, vec![alert.id]);
        assert_eq!(h.shown(), vec![alert.id]);
    }

    #[tokio::test]
    async fn test_past_one_shot_is_not_watched() {
        let h = harness(at(2, 10, 0, 0));
        let past = h
            .add(NewAlert::new(AlertCategory::Medication, "Doctor").at("09:00").once_on("2024-06-01"))
            .await;
        let future = h
            .add(NewAlert::new(AlertCategory::Medication, "Dentist").at("09:00").once_on("2024-06-03"))
            .await;

        assert!(h.scheduler.schedule_alert(past.clone()).is_none());
        assert!(h.scheduler.schedule_alert(future.clone()).is_some());
        assert!(!h.scheduler.is_watching(past.id));

        let handles = h.scheduler.schedule_all_alerts(vec![past, future.clone()]);
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].alert_id, future.id);
    }

    #[tokio::test]
    async fn test_one_shot_dropped_once_its_slot_passes() {
        let h = harness(at(1, 8, 59, 0));
        let alert = h
            .add(NewAlert::new(AlertCategory::Medication, "Doctor").at("09:00").once_on("2024-06-01"))
            .await;
        h.scheduler.schedule_alert(alert.clone());

        // wall clock skips over the whole target minute
        h.tick_at(at(1, 9, 5, 0)).await;
        assert!(!h.scheduler.is_watching(alert.id));
        assert!(h.shown().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let h = harness(at(1, 7, 0, 0));
        assert!(!h.scheduler.cancel_alert(5));

        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("07:01")).await;
        h.scheduler.schedule_alert(alert.clone());
        assert!(h.scheduler.cancel_alert(alert.id));
        assert!(!h.scheduler.cancel_alert(alert.id));
        assert_eq!(h.scheduler.watch_count(), 0);

        assert_eq!(h.tick_at(at(1, 7, 1, 0)).await.evaluated, 0);
        assert!(h.shown().is_empty());
    }

    #[tokio::test]
    async fn test_rescheduling_keeps_one_watch() {
        let h = harness(at(1, 7, 59, 0));
        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("08:00")).await;
        let first = h.scheduler.schedule_alert(alert.clone());
        h.scheduler.schedule_alert(alert.clone());
        let third = h.scheduler.schedule_alert(alert.clone());
        assert_ne!(first, third);
        assert_eq!(h.scheduler.watch_count(), 1);

        // stale heap entries from the first two schedules are ignored
        assert_eq!(h.tick_at(at(1, 8, 0, 0)).await.evaluated, 1);

        h.scheduler.cancel_alert(alert.id);
        h.tick_at(at(2, 8, 0, 0)).await;
        assert_eq!(h.shown(), vec![alert.id]);
    }

    #[tokio::test]
    async fn test_schedule_all_replaces_and_skips_disabled() {
        let h = harness(at(1, 6, 0, 0));
        let a = h.add(NewAlert::new(AlertCategory::Water, "a").at("08:00")).await;
        let b = h.add(NewAlert::new(AlertCategory::Sleep, "b").at("22:00").enabled(false)).await;
        let c = h.add(NewAlert::new(AlertCategory::Meal, "c").at("12:00")).await;

        for _ in 0..3 {
            h.scheduler.schedule_all_alerts(vec![a.clone(), b.clone(), c.clone()]);
        }
        assert_eq!(h.scheduler.watch_count(), 2);
        assert!(!h.scheduler.is_watching(b.id));
        let ids: Vec<AlertId> = h.scheduler.scheduled_alerts().iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);

        h.scheduler.clear_all_notifications();
        assert_eq!(h.scheduler.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_alert_does_not_stop_others() {
        let h = harness(at(1, 7, 59, 50));
        let broken = Alert::daily(40, AlertCategory::Custom, "???", "");
        let good = h.add(NewAlert::new(AlertCategory::Water, "Water").at("08:00")).await;
        h.scheduler.schedule_all_alerts(vec![broken, good.clone()]);

        let report = h.tick_at(at(1, 8, 0, 20)).await;
        assert_eq!(report.malformed, vec![40]);
        assert_eq!(report.fired, vec![good.id]);
        assert!(h.scheduler.is_watching(40));
    }

    #[tokio::test]
    async fn test_missing_store_record_still_shows() {
        let h = harness(at(1, 7, 59, 50));
        let orphan = Alert::daily(12, AlertCategory::Exercise, "Stretch", "08:00");
        h.scheduler.schedule_alert(orphan);
        assert_eq!(h.tick_at(at(1, 8, 0, 0)).await.fired, vec![12]);
        assert_eq!(h.shown(), vec![12]);
    }

    #[tokio::test]
    async fn test_simulate_notification() {
        let h = harness(at(1, 15, 0, 0));
        let alert = h.add(NewAlert::new(AlertCategory::Custom, "Hi").at("03:00")).await;
        h.scheduler.simulate_notification(alert.clone()).await.unwrap();
        assert_eq!(h.shown(), vec![alert.id]);
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let h = harness(at(1, 0, 0, 0));
        let scheduler = NotificationScheduler::new(h.manager.clone(), h.store.clone(), h.clock.clone())
            .with_poll_interval(Duration::from_secs(600));
        assert_eq!(scheduler.poll_interval(), Duration::from_secs(60));
        let scheduler = scheduler.with_poll_interval(Duration::ZERO);
        assert_eq!(scheduler.poll_interval(), Duration::from_secs(1));
        assert_eq!(h.scheduler.poll_interval(), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_run_until_stops_and_clears() {
        let h = harness(at(1, 7, 0, 0));
        let alert = h.add(NewAlert::new(AlertCategory::Water, "Water").at("09:00")).await;
        h.scheduler.schedule_alert(alert);

        h.scheduler.run_until(async {}).await;
        assert_eq!(h.scheduler.watch_count(), 0);
    }
}
