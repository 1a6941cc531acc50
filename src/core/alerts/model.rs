// Alert model types for reminder configuration and store payloads.
//
// Field names serialize in camelCase so exported backups stay readable by
// older builds of the app.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub type AlertId = u64;

/// Id used by the simulated water reminder. Never assigned by the store.
pub const SIMULATED_ALERT_ID: AlertId = 999;

/// Reminder category, drives copy and the water-only full screen action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Medication,
    Water,
    Exercise,
    Sleep,
    Meal,
    Custom,
}

impl AlertCategory {
    /// Get the display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Medication => "Medication Reminder",
            Self::Water => "Water Reminder",
            Self::Exercise => "Exercise Reminder",
            Self::Sleep => "Sleep Reminder",
            Self::Meal => "Meal Reminder",
            Self::Custom => "Custom Alert",
        }
    }

    /// Message used when the user leaves the text empty
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::Medication => "Time to take your medication",
            Self::Water => "Remember to drink water",
            Self::Exercise => "Time for your workout",
            Self::Sleep => "Time to get ready for bed",
            Self::Meal => "Time for your meal",
            Self::Custom => "Custom reminder",
        }
    }

    /// Suggested hour:minute for a new alert of this category
    pub fn default_time(&self) -> &'static str {
        match self {
            Self::Medication => "09:00",
            Self::Water => "10:00",
            Self::Exercise => "18:00",
            Self::Sleep => "22:00",
            Self::Meal => "12:00",
            Self::Custom => "15:00",
        }
    }

    pub fn all() -> &'static [AlertCategory] {
        &[
            Self::Medication,
            Self::Water,
            Self::Exercise,
            Self::Sleep,
            Self::Meal,
            Self::Custom,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    Daily,
    Once,
}

/// A user-configured reminder.
///
/// `time` is kept as the raw "HH:MM" text the user entered; it is parsed at
/// evaluation time so one bad record cannot poison a whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: AlertId,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub message: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, rename = "frequency")]
    pub recurrence: Recurrence,
    /// Calendar date ("YYYY-MM-DD") for one-shot alerts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Combined date and time for one-shot alerts, preferred over `date` + `time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<NaiveDateTime>,
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_triggered: Option<NaiveDateTime>,
}

impl Alert {
    /// Minimal daily alert, mostly useful for synthetic triggers.
    pub fn daily(id: AlertId, category: AlertCategory, message: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            id,
            category,
            message: message.into(),
            time: time.into(),
            recurrence: Recurrence::Daily,
            date: None,
            date_time: None,
            enabled: true,
            is_default: false,
            created_at: None,
            updated_at: None,
            last_triggered: None,
        }
    }

    pub fn is_water(&self) -> bool {
        self.category == AlertCategory::Water
    }
}

/// Input for creating an alert. Missing fields take store defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub message: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, rename = "frequency")]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub is_default: bool,
}

impl NewAlert {
    pub fn new(category: AlertCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            time: None,
            recurrence: None,
            date: None,
            date_time: None,
            enabled: None,
            is_default: false,
        }
    }

    pub fn at(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn once_on(mut self, date: impl Into<String>) -> Self {
        self.recurrence = Some(Recurrence::Once);
        self.date = Some(date.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }
}

/// Partial update. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPatch {
    #[serde(rename = "type")]
    pub category: Option<AlertCategory>,
    pub message: Option<String>,
    pub time: Option<String>,
    #[serde(rename = "frequency")]
    pub recurrence: Option<Recurrence>,
    pub date: Option<String>,
    pub date_time: Option<NaiveDateTime>,
    pub enabled: Option<bool>,
}

impl AlertPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn apply(self, alert: &mut Alert) {
        if let Some(category) = self.category {
            alert.category = category;
        }
        if let Some(message) = self.message {
            alert.message = message;
        }
        if let Some(time) = self.time {
            alert.time = time;
        }
        if let Some(recurrence) = self.recurrence {
            alert.recurrence = recurrence;
        }
        if let Some(date) = self.date {
            alert.date = Some(date);
        }
        if let Some(date_time) = self.date_time {
            alert.date_time = Some(date_time);
        }
        if let Some(enabled) = self.enabled {
            alert.enabled = enabled;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub by_category: HashMap<AlertCategory, usize>,
}

impl AlertStats {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut by_category = HashMap::new();
        for alert in alerts {
            *by_category.entry(alert.category).or_insert(0) += 1;
        }
        let active = alerts.iter().filter(|a| a.enabled).count();
        Self {
            total: alerts.len(),
            active,
            inactive: alerts.len() - active,
            by_category,
        }
    }
}

/// Backup payload written by export and read back by import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsExport {
    pub alerts: Vec<Alert>,
    pub export_date: NaiveDateTime,
    pub version: String,
}
