use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::SessionError,
    presence::Sensitivity,
    session::{MachineConfig, SessionConfig},
};

#[cfg(unix)]
const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";
#[cfg(windows)]
const DEFAULT_HOSTS_FILE: &str = r"C:\Windows\System32\drivers\etc\hosts";

/// Longest session accepted from settings or the command line.
pub const MAX_SESSION_MINUTES: u64 = 24 * 60;

/// Converts a user-supplied session length, rejecting zero and anything past
/// [`MAX_SESSION_MINUTES`].
pub fn session_length(minutes: u64) -> Result<Duration, SessionError> {
    if minutes == 0 {
        return Err(SessionError::InvalidConfig(
            "session length must be greater than zero minutes".into(),
        ));
    }
    minutes
        .checked_mul(60)
        .filter(|_| minutes <= MAX_SESSION_MINUTES)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            SessionError::InvalidConfig(format!(
                "session length must be at most {MAX_SESSION_MINUTES} minutes"
            ))
        })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraSettings {
    /// Image the external capture tool keeps overwriting with the latest frame.
    pub snapshot_path: PathBuf,
    /// Frame of the empty workstation used as the "not present" reference.
    pub baseline_path: PathBuf,
    pub frame_interval_ms: u64,
    pub sensitivity: Sensitivity,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            snapshot_path: std::env::temp_dir().join("focusbuddy-frame.jpg"),
            baseline_path: PathBuf::from("baseline.png"),
            frame_interval_ms: 200,
            sensitivity: Sensitivity::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FocusSettings {
    pub grace_period_seconds: u64,
    pub hardcore_lock_window_seconds: u64,
    pub stabilizer_window_size: usize,
    pub alert_period_seconds: u64,
    pub session_duration_minutes: u64,
    pub distracting_sites: Vec<String>,
    pub distracting_apps: Vec<String>,
    pub alert_messages: Vec<String>,
    pub alert_sound: bool,
    pub hosts_file: PathBuf,
    pub camera: CameraSettings,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: 3,
            hardcore_lock_window_seconds: 1500,
            stabilizer_window_size: 5,
            alert_period_seconds: 3,
            session_duration_minutes: 25,
            distracting_sites: [
                "youtube.com",
                "facebook.com",
                "twitter.com",
                "instagram.com",
                "reddit.com",
                "tiktok.com",
                "netflix.com",
                "twitch.tv",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            distracting_apps: vec!["steam".into(), "discord".into()],
            alert_messages: [
                "Hey! Get back to work!",
                "Focus time is not over yet.",
                "Your desk misses you.",
                "Eyes on the task, please.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            alert_sound: true,
            hosts_file: PathBuf::from(DEFAULT_HOSTS_FILE),
            camera: CameraSettings::default(),
        }
    }
}

impl FocusSettings {
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |message: &str| Err(SessionError::InvalidConfig(message.to_string()));
        if self.grace_period_seconds == 0 {
            return invalid("grace_period_seconds must be greater than zero");
        }
        if self.alert_period_seconds == 0 {
            return invalid("alert_period_seconds must be greater than zero");
        }
        if self.stabilizer_window_size == 0 {
            return invalid("stabilizer_window_size must be greater than zero");
        }
        session_length(self.session_duration_minutes).map_err(|_| {
            SessionError::InvalidConfig(format!(
                "session_duration_minutes must be between 1 and {MAX_SESSION_MINUTES}"
            ))
        })?;
        if self.alert_messages.iter().all(|message| message.trim().is_empty()) {
            return invalid("alert_messages must contain at least one message");
        }
        if self.camera.frame_interval_ms == 0 {
            return invalid("camera.frame_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn session_duration(&self) -> Result<Duration, SessionError> {
        session_length(self.session_duration_minutes)
    }

    /// Returns a copy with the dotted `key` (e.g. `camera.sensitivity`) set to
    /// `raw`. `raw` is parsed as JSON and taken as a plain string otherwise.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self> {
        let mut document = serde_json::to_value(self)?;
        let mut slot = &mut document;
        for part in key.split('.') {
            slot = slot
                .as_object_mut()
                .and_then(|object| object.get_mut(part))
                .ok_or_else(|| anyhow!("unknown setting `{key}`"))?;
        }
        *slot = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        serde_json::from_value(document).with_context(|| format!("invalid value for `{key}`"))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            machine: MachineConfig {
                grace_period: Duration::from_secs(self.grace_period_seconds),
                lock_window: Duration::from_secs(self.hardcore_lock_window_seconds),
            },
            stabilizer_window: self.stabilizer_window_size,
            alert_period: Duration::from_secs(self.alert_period_seconds),
            alert_messages: self
                .alert_messages
                .iter()
                .filter(|message| !message.trim().is_empty())
                .cloned()
                .collect(),
            distracting_sites: self.distracting_sites.clone(),
            distracting_apps: self.distracting_apps.clone(),
            frame_interval: Duration::from_millis(self.camera.frame_interval_ms),
            ..SessionConfig::default()
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<FocusSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when the file is missing or
    /// unreadable as JSON.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring malformed settings at {}: {err}; using defaults",
                    path.display()
                );
                FocusSettings::default()
            })
        } else {
            FocusSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> FocusSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validates and persists `settings`; invalid input leaves the store untouched.
    pub fn update(&self, settings: FocusSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &FocusSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_match_documented_values() {
        let settings = FocusSettings::default();
        settings.validate().unwrap();

        let config = settings.session_config();
        assert_eq!(config.machine.grace_period, Duration::from_secs(3));
        assert_eq!(config.machine.lock_window, Duration::from_secs(1500));
        assert_eq!(config.stabilizer_window, 5);
        assert_eq!(config.alert_period, Duration::from_secs(3));
        assert_eq!(settings.session_duration().unwrap(), Duration::from_secs(25 * 60));
    }

    #[test]
    fn rejects_zero_grace_and_empty_messages() {
        let mut settings = FocusSettings::default();
        settings.grace_period_seconds = 0;
        assert!(matches!(
            settings.validate(),
            Err(SessionError::InvalidConfig(_))
        ));

        let mut settings = FocusSettings::default();
        settings.alert_messages = vec!["  ".into()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn huge_session_length_is_rejected_without_overflow() {
        assert!(matches!(
            session_length(307_445_734_561_825_861),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(session_length(u64::MAX).is_err());
        assert!(session_length(0).is_err());
        assert_eq!(
            session_length(MAX_SESSION_MINUTES).unwrap(),
            Duration::from_secs(MAX_SESSION_MINUTES * 60)
        );

        let mut settings = FocusSettings::default();
        settings.session_duration_minutes = u64::MAX;
        assert!(settings.validate().is_err());
        assert!(settings.session_duration().is_err());
    }

    #[test]
    fn with_value_sets_nested_keys() {
        let settings = FocusSettings::default();

        let changed = settings
            .with_value("camera.sensitivity", "high")
            .unwrap()
            .with_value("grace_period_seconds", "10")
            .unwrap()
            .with_value("distracting_apps", r#"["steam"]"#)
            .unwrap();

        assert_eq!(changed.camera.sensitivity, Sensitivity::High);
        assert_eq!(changed.grace_period_seconds, 10);
        assert_eq!(changed.distracting_apps, vec!["steam".to_string()]);
        assert!(settings.with_value("camera.zoom", "2").is_err());
        assert!(settings.with_value("grace_period_seconds", "soon").is_err());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "grace_period_seconds": 7 }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.get();

        assert_eq!(settings.grace_period_seconds, 7);
        assert_eq!(settings.hardcore_lock_window_seconds, 1500);
        assert_eq!(settings.camera.frame_interval_ms, 200);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();

        assert_eq!(store.get(), FocusSettings::default());
    }

    #[test]
    fn update_persists_and_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.session_duration_minutes = 50;
        store.update(settings).unwrap();
        assert_eq!(
            SettingsStore::new(path.clone()).unwrap().get().session_duration_minutes,
            50
        );

        let mut broken = store.get();
        broken.alert_period_seconds = 0;
        assert!(store.update(broken).is_err());
        assert_eq!(store.get().alert_period_seconds, 3);
    }
}
