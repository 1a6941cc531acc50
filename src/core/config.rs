use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_DIR_ENV: &str = "COUPLE_REMINDERS_CONFIG_DIR";
const APP_DIR_NAME: &str = "couple-reminders";

/// Application settings, persisted as settings.json.
/// Missing fields fall back to their defaults so older files keep loading.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding alerts.json
    pub data_dir: PathBuf,
    pub poll_interval_seconds: u64,
    pub debounce_seconds: u64,
    /// Pause between the curtain reset and showing a replacement notification
    pub settle_delay_ms: u64,
    /// Seed the default water reminders when no alerts exist yet
    pub seed_default_alerts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_config_dir(),
            poll_interval_seconds: 30,
            debounce_seconds: 120,
            settle_delay_ms: 50,
            seed_default_alerts: true,
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.data_dir.join("alerts.json")
    }
}

/// `$COUPLE_REMINDERS_CONFIG_DIR`, else `$HOME/.config/couple-reminders`.
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join(APP_DIR_NAME)
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring unparseable {:?}: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Could not read {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
