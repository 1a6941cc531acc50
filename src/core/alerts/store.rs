//! Persistent storage for alert records.
//!
//! Alerts live in memory and, when a path is configured, are written back
//! as pretty JSON after every mutation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::model::{Alert, AlertCategory, AlertId, AlertPatch, AlertStats, AlertsExport, NewAlert, Recurrence};
use crate::core::clock::Clock;
use crate::core::error::{AlertError, AlertResult};

const EXPORT_VERSION: &str = "1.0";
const FALLBACK_TIME: &str = "09:00";

const DEFAULT_WATER_SCHEDULE: [(&str, &str); 8] = [
    ("08:00", "Good morning! Start your day with water"),
    ("10:00", "Mid-morning hydration time!"),
    ("12:00", "Lunch time water break!"),
    ("14:00", "Afternoon refresh - drink up!"),
    ("16:00", "Keep the energy flowing with water!"),
    ("18:00", "Evening hydration check!"),
    ("20:00", "Dinner time water reminder!"),
    ("21:30", "Last water of the day - sweet dreams!"),
];

/// Alert record collaborator used by the scheduler and notification hub.
///
/// Every id-addressed operation fails with `AlertError::NotFound` when the
/// id is unknown.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// All alerts, newest first.
    async fn get_alerts(&self) -> AlertResult<Vec<Alert>>;
    /// Enabled alerts only.
    async fn get_active_alerts(&self) -> AlertResult<Vec<Alert>>;
    async fn get_alert(&self, id: AlertId) -> AlertResult<Alert>;
    async fn get_alerts_by_category(&self, category: AlertCategory) -> AlertResult<Vec<Alert>>;
    async fn add_alert(&self, new_alert: NewAlert) -> AlertResult<Alert>;
    async fn update_alert(&self, id: AlertId, patch: AlertPatch) -> AlertResult<Alert>;
    async fn delete_alert(&self, id: AlertId) -> AlertResult<Alert>;
    async fn toggle_alert(&self, id: AlertId) -> AlertResult<Alert>;
    /// Stamp `last_triggered` with the current time.
    async fn mark_alert_triggered(&self, id: AlertId) -> AlertResult<Alert>;
}

#[derive(Clone)]
struct StoreState {
    alerts: Vec<Alert>,
    next_id: AlertId,
}

impl StoreState {
    fn find_mut(&mut self, id: AlertId) -> AlertResult<&mut Alert> {
        self.alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AlertError::NotFound(id))
    }

    fn insert(&mut self, new_alert: NewAlert, now: chrono::NaiveDateTime) -> Alert {
        let alert = Alert {
            id: self.next_id,
            category: new_alert.category,
            message: new_alert.message,
            time: new_alert.time.unwrap_or_else(|| FALLBACK_TIME.to_string()),
            recurrence: new_alert.recurrence.unwrap_or_default(),
            date: new_alert.date,
            date_time: new_alert.date_time,
            enabled: new_alert.enabled.unwrap_or(true),
            is_default: new_alert.is_default,
            created_at: Some(now),
            updated_at: None,
            last_triggered: None,
        };
        self.next_id += 1;
        self.alerts.push(alert.clone());
        alert
    }
}

/// In-memory alert store with optional JSON file persistence.
pub struct JsonAlertStore {
    path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

impl JsonAlertStore {
    /// Create a store that never touches disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            path: None,
            clock,
            state: Mutex::new(StoreState {
                alerts: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Open (or start) a file-backed store.
    ///
    /// A missing file starts empty. An unreadable or corrupt file is an
    /// error rather than silently discarding the user's alerts.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> AlertResult<Self> {
        let path = path.as_ref().to_path_buf();
        let alerts: Vec<Alert> = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        let next_id = next_id_after(&alerts);
        log::info!("Loaded {} alerts from {:?}", alerts.len(), path);
        Ok(Self {
            path: Some(path),
            clock,
            state: Mutex::new(StoreState { alerts, next_id }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &StoreState) -> AlertResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&state.alerts)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Run `f` on a draft of the state. The draft replaces the live state
    /// only after it has been written, so a failed write changes nothing.
    fn transact<T>(&self, f: impl FnOnce(&mut StoreState) -> AlertResult<T>) -> AlertResult<T> {
        let mut state = self.lock();
        let mut draft = state.clone();
        let out = f(&mut draft)?;
        self.persist(&draft)?;
        *state = draft;
        Ok(out)
    }

    /// Apply `f` to the alert with `id`, persist, and return the updated copy.
    fn modify(&self, id: AlertId, f: impl FnOnce(&mut Alert)) -> AlertResult<Alert> {
        self.transact(|state| {
            let alert = state.find_mut(id)?;
            f(alert);
            Ok(alert.clone())
        })
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats::from_alerts(&self.lock().alerts)
    }

    pub fn export(&self) -> AlertsExport {
        AlertsExport {
            alerts: self.lock().alerts.clone(),
            export_date: self.clock.now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    /// Replace every alert with the backup contents.
    pub fn import(&self, data: AlertsExport) -> AlertResult<Vec<Alert>> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = data.alerts.iter().find(|a| !seen.insert(a.id)) {
            return Err(AlertError::InvalidData(format!("duplicate alert id {}", dup.id)));
        }
        let imported = self.transact(|state| {
            state.next_id = next_id_after(&data.alerts);
            state.alerts = data.alerts;
            Ok(state.alerts.clone())
        })?;
        log::info!("Imported {} alerts (backup version {})", imported.len(), data.version);
        Ok(imported)
    }

    /// Parse and import a JSON backup.
    pub fn import_json(&self, json: &str) -> AlertResult<Vec<Alert>> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.get("alerts").is_some_and(serde_json::Value::is_array) {
            return Err(AlertError::InvalidData("missing alerts list".to_string()));
        }
        self.import(serde_json::from_value(value)?)
    }

    /// Remove every alert and restart ids at 1.
    pub fn clear(&self) -> AlertResult<()> {
        self.transact(|state| {
            state.alerts.clear();
            state.next_id = 1;
            Ok(())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lock().alerts.is_empty()
    }

    /// Replace all water alerts with the default eight-a-day schedule.
    pub fn create_default_water_alerts(&self) -> AlertResult<Vec<Alert>> {
        let now = self.clock.now();
        self.transact(|state| {
            state.alerts.retain(|a| a.category != AlertCategory::Water);
            Ok(DEFAULT_WATER_SCHEDULE
                .iter()
                .map(|(time, message)| {
                    let mut new_alert = NewAlert::new(AlertCategory::Water, *message).at(*time);
                    new_alert.recurrence = Some(Recurrence::Daily);
                    new_alert.is_default = true;
                    state.insert(new_alert, now)
                })
                .collect())
        })
    }

    /// Demo data: a few daily alerts across categories, one disabled.
    pub fn create_sample_alerts(&self) -> AlertResult<Vec<Alert>> {
        let now = self.clock.now();
        let samples = [
            NewAlert::new(AlertCategory::Medication, "Take morning vitamins").at("08:00"),
            NewAlert::new(AlertCategory::Water, "Drink a glass of water").at("10:00"),
            NewAlert::new(AlertCategory::Exercise, "Evening workout time").at("18:30"),
            NewAlert::new(AlertCategory::Sleep, "Start winding down for bed")
                .at("22:00")
                .enabled(false),
        ];
        self.transact(|state| {
            for sample in samples {
                state.insert(sample, now);
            }
            Ok(state.alerts.clone())
        })
    }
}

fn next_id_after(alerts: &[Alert]) -> AlertId {
    alerts.iter().map(|a| a.id).max().unwrap_or(0) + 1
}

#[async_trait]
impl AlertStore for JsonAlertStore {
    async fn get_alerts(&self) -> AlertResult<Vec<Alert>> {
        let mut alerts = self.lock().alerts.clone();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn get_active_alerts(&self) -> AlertResult<Vec<Alert>> {
        Ok(self.lock().alerts.iter().filter(|a| a.enabled).cloned().collect())
    }

    async fn get_alert(&self, id: AlertId) -> AlertResult<Alert> {
        self.lock()
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(AlertError::NotFound(id))
    }

    async fn get_alerts_by_category(&self, category: AlertCategory) -> AlertResult<Vec<Alert>> {
        Ok(self
            .lock()
            .alerts
            .iter()
            .filter(|a| a.category == category)
            .cloned()
            .collect())
    }

    async fn add_alert(&self, new_alert: NewAlert) -> AlertResult<Alert> {
        let now = self.clock.now();
        let alert = self.transact(|state| Ok(state.insert(new_alert, now)))?;
        log::debug!("Added alert {} ({:?} at {})", alert.id, alert.category, alert.time);
        Ok(alert)
    }

    async fn update_alert(&self, id: AlertId, patch: AlertPatch) -> AlertResult<Alert> {
        let now = self.clock.now();
        self.modify(id, |alert| {
            patch.apply(alert);
            alert.updated_at = Some(now);
        })
    }

    async fn delete_alert(&self, id: AlertId) -> AlertResult<Alert> {
        self.transact(|state| {
            let index = state
                .alerts
                .iter()
                .position(|a| a.id == id)
                .ok_or(AlertError::NotFound(id))?;
            Ok(state.alerts.remove(index))
        })
    }

    async fn toggle_alert(&self, id: AlertId) -> AlertResult<Alert> {
        let now = self.clock.now();
        self.modify(id, |alert| {
            alert.enabled = !alert.enabled;
            alert.updated_at = Some(now);
        })
    }

    async fn mark_alert_triggered(&self, id: AlertId) -> AlertResult<Alert> {
        let now = self.clock.now();
        self.modify(id, |alert| alert.last_triggered = Some(now))
    }
}
