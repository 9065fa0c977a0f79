//! Persisted app state (platform toggles, sidebar order, general settings) and
//! performance settings.
//!
//! The settings UI writes through [`SettingsStore`]; the aggregator and session
//! manager read a fresh copy on every computation instead of caching it.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    clock::minutes_of_day,
    consts::{
        APP_STATE_FILE, DEFAULT_DND_END, DEFAULT_DND_START, DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
        DEFAULT_MAX_ACTIVE_SESSIONS, MAX_INACTIVITY_TIMEOUT_MINUTES, MIN_INACTIVITY_TIMEOUT_MINUTES,
        MIN_MAX_ACTIVE_SESSIONS, PERFORMANCE_FILE,
    },
    error::{Error, Result},
    registry::PlatformRegistry,
    storage::{read_json, write_json_with_retry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppToggle {
    pub enabled: bool,
    pub notifications: bool,
}

impl Default for AppToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneralSettings {
    pub theme: String,
    pub sidebar_density: String,
    pub global_notifications: bool,
    pub badge_dock_icon: bool,
    pub notification_preview: bool,
    pub notification_sounds: bool,
    pub show_welcome: bool,
    pub launch_at_login: bool,
    pub last_active_tab: Option<String>,
    pub sidebar_collapsed: bool,
    pub do_not_disturb: bool,
    pub do_not_disturb_schedule: bool,
    pub do_not_disturb_start: String,
    pub do_not_disturb_end: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            theme: "system".to_string(),
            sidebar_density: "comfortable".to_string(),
            global_notifications: true,
            badge_dock_icon: true,
            notification_preview: true,
            notification_sounds: true,
            show_welcome: true,
            launch_at_login: false,
            last_active_tab: None,
            sidebar_collapsed: false,
            do_not_disturb: false,
            do_not_disturb_schedule: false,
            do_not_disturb_start: DEFAULT_DND_START.to_string(),
            do_not_disturb_end: DEFAULT_DND_END.to_string(),
        }
    }
}

impl GeneralSettings {
    /// Manual toggle, or the schedule covers `now`. A schedule whose start is
    /// after its end wraps past midnight; equal bounds describe an empty window.
    pub fn is_do_not_disturb_active(&self, now: NaiveTime) -> bool {
        if self.do_not_disturb {
            return true;
        }
        if !self.do_not_disturb_schedule {
            return false;
        }

        let start = parse_hhmm(&self.do_not_disturb_start)
            .or_else(|| parse_hhmm(DEFAULT_DND_START))
            .map_or(0, minutes_of_day);
        let end = parse_hhmm(&self.do_not_disturb_end)
            .or_else(|| parse_hhmm(DEFAULT_DND_END))
            .map_or(0, minutes_of_day);
        let current = minutes_of_day(now);

        if start > end {
            current >= start || current < end
        } else {
            current >= start && current < end
        }
    }
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppStateDoc {
    pub apps: BTreeMap<String, AppToggle>,
    pub order: Vec<String>,
    pub settings: GeneralSettings,
}

impl AppStateDoc {
    pub fn defaults_for(registry: &PlatformRegistry) -> Self {
        Self {
            apps: registry
                .ids()
                .map(|id| (id.to_string(), AppToggle::default()))
                .collect(),
            order: registry.ids().map(str::to_string).collect(),
            settings: GeneralSettings::default(),
        }
    }

    /// Fills in registry platforms missing from `apps`/`order` and drops ids
    /// the registry no longer knows.
    pub fn normalize(mut self, registry: &PlatformRegistry) -> Self {
        self.apps.retain(|id, _| registry.contains(id));
        self.order.retain(|id| registry.contains(id));
        let mut seen = std::collections::HashSet::new();
        self.order.retain(|id| seen.insert(id.clone()));

        for id in registry.ids() {
            self.apps.entry(id.to_string()).or_default();
            if !self.order.iter().any(|existing| existing == id) {
                self.order.push(id.to_string());
            }
        }
        self
    }

    pub fn toggle(&self, id: &str) -> AppToggle {
        self.apps.get(id).copied().unwrap_or_default()
    }

    pub fn is_platform_enabled(&self, id: &str) -> bool {
        self.toggle(id).enabled
    }

    /// Notifications count only for enabled platforms.
    pub fn is_notifications_enabled(&self, id: &str) -> bool {
        let toggle = self.toggle(id);
        toggle.enabled && toggle.notifications
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceSettings {
    #[serde(alias = "maxActiveWebviews")]
    pub max_active_sessions: usize,
    pub inactivity_timeout_minutes: u64,
    pub hardware_acceleration: bool,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_active_sessions: DEFAULT_MAX_ACTIVE_SESSIONS,
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
            hardware_acceleration: true,
        }
    }
}

impl PerformanceSettings {
    pub fn clamped(self) -> Self {
        Self {
            max_active_sessions: self.max_active_sessions.max(MIN_MAX_ACTIVE_SESSIONS),
            inactivity_timeout_minutes: self
                .inactivity_timeout_minutes
                .clamp(MIN_INACTIVITY_TIMEOUT_MINUTES, MAX_INACTIVITY_TIMEOUT_MINUTES),
            hardware_acceleration: self.hardware_acceleration,
        }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_minutes.saturating_mul(60))
    }
}

/// Partial update sent by the settings UI; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformancePatch {
    #[serde(alias = "maxActiveWebviews")]
    pub max_active_sessions: Option<usize>,
    pub inactivity_timeout_minutes: Option<u64>,
    pub hardware_acceleration: Option<bool>,
}

pub struct SettingsStore {
    dir: Option<PathBuf>,
    registry: PlatformRegistry,
    app_state: Mutex<AppStateDoc>,
    performance: Mutex<PerformanceSettings>,
}

impl SettingsStore {
    /// Loads both documents from `dir`, merging with defaults.
    pub fn load(dir: &Path, registry: &PlatformRegistry) -> Result<Self> {
        let app_state = read_json::<AppStateDoc>(&dir.join(APP_STATE_FILE))?
            .map(|doc| doc.normalize(registry))
            .unwrap_or_else(|| AppStateDoc::defaults_for(registry));
        let performance = read_json::<PerformanceSettings>(&dir.join(PERFORMANCE_FILE))?
            .unwrap_or_default()
            .clamped();
        info!(
            platforms = app_state.apps.len(),
            max_active_sessions = performance.max_active_sessions,
            inactivity_timeout_minutes = performance.inactivity_timeout_minutes,
            "settings loaded"
        );

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            registry: registry.clone(),
            app_state: Mutex::new(app_state),
            performance: Mutex::new(performance),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory(registry: &PlatformRegistry) -> Self {
        Self {
            dir: None,
            registry: registry.clone(),
            app_state: Mutex::new(AppStateDoc::defaults_for(registry)),
            performance: Mutex::new(PerformanceSettings::default()),
        }
    }

    pub fn app_state(&self) -> AppStateDoc {
        self.app_state
            .lock()
            .map(|doc| doc.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn general(&self) -> GeneralSettings {
        self.app_state().settings
    }

    pub fn performance(&self) -> PerformanceSettings {
        self.performance
            .lock()
            .map(|settings| *settings)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    /// Applies `update` to the app state and persists it. The in-memory copy
    /// is kept even when the write fails.
    pub fn update_app_state(&self, update: impl FnOnce(&mut AppStateDoc)) -> Result<AppStateDoc> {
        let doc = {
            let mut guard = self.app_state.lock().map_err(|_| Error::LockPoisoned)?;
            update(&mut guard);
            let normalized = guard.clone().normalize(&self.registry);
            *guard = normalized.clone();
            normalized
        };
        self.persist(APP_STATE_FILE, &doc)?;
        Ok(doc)
    }

    pub fn update_general(&self, update: impl FnOnce(&mut GeneralSettings)) -> Result<GeneralSettings> {
        self.update_app_state(|doc| update(&mut doc.settings))
            .map(|doc| doc.settings)
    }

    pub fn set_platform_enabled(&self, id: &str, enabled: bool) -> Result<AppStateDoc> {
        self.registry.require(id)?;
        self.update_app_state(|doc| {
            doc.apps.entry(id.to_string()).or_default().enabled = enabled;
        })
    }

    pub fn set_platform_notifications(&self, id: &str, enabled: bool) -> Result<AppStateDoc> {
        self.registry.require(id)?;
        self.update_app_state(|doc| {
            doc.apps.entry(id.to_string()).or_default().notifications = enabled;
        })
    }

    pub fn reorder(&self, order: Vec<String>) -> Result<AppStateDoc> {
        if let Some(unknown) = order.iter().find(|id| !self.registry.contains(id)) {
            return Err(Error::UnknownPlatform(unknown.clone()));
        }
        self.update_app_state(|doc| doc.order = order)
    }

    pub fn reset(&self) -> Result<AppStateDoc> {
        let defaults = AppStateDoc::defaults_for(&self.registry);
        self.update_app_state(|doc| *doc = defaults)
    }

    /// Takes effect for eviction timers armed after this call.
    pub fn update_performance(&self, patch: PerformancePatch) -> Result<PerformanceSettings> {
        let updated = {
            let mut guard = self.performance.lock().map_err(|_| Error::LockPoisoned)?;
            let mut next = *guard;
            if let Some(max) = patch.max_active_sessions {
                next.max_active_sessions = max;
            }
            if let Some(minutes) = patch.inactivity_timeout_minutes {
                next.inactivity_timeout_minutes = minutes;
            }
            if let Some(enabled) = patch.hardware_acceleration {
                next.hardware_acceleration = enabled;
            }
            *guard = next.clamped();
            *guard
        };
        self.persist(PERFORMANCE_FILE, &updated)?;
        Ok(updated)
    }

    fn persist<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let Some(dir) = self.dir.as_deref() else {
            return Ok(());
        };
        write_json_with_retry(&dir.join(file), value).map_err(|error| {
            warn!(file, %error, "settings write failed, keeping in-memory state");
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn scheduled(start: &str, end: &str) -> GeneralSettings {
        GeneralSettings {
            do_not_disturb_schedule: true,
            do_not_disturb_start: start.to_string(),
            do_not_disturb_end: end.to_string(),
            ..GeneralSettings::default()
        }
    }

    #[test]
    fn dnd_schedule_wraps_past_midnight() {
        let settings = scheduled("22:00", "08:00");
        assert!(settings.is_do_not_disturb_active(at(23, 30)));
        assert!(settings.is_do_not_disturb_active(at(2, 0)));
        assert!(!settings.is_do_not_disturb_active(at(12, 0)));
        assert!(!settings.is_do_not_disturb_active(at(8, 0)));
        assert!(settings.is_do_not_disturb_active(at(22, 0)));
    }

    #[test]
    fn dnd_same_day_window_and_manual_toggle() {
        let settings = scheduled("12:00", "14:00");
        assert!(settings.is_do_not_disturb_active(at(13, 15)));
        assert!(!settings.is_do_not_disturb_active(at(14, 0)));

        let manual = GeneralSettings {
            do_not_disturb: true,
            ..GeneralSettings::default()
        };
        assert!(manual.is_do_not_disturb_active(at(12, 0)));
        assert!(!GeneralSettings::default().is_do_not_disturb_active(at(23, 0)));
    }

    #[test]
    fn unparseable_schedule_bounds_use_defaults() {
        let settings = scheduled("late", "25:99");
        assert!(settings.is_do_not_disturb_active(at(23, 0)));
        assert!(!settings.is_do_not_disturb_active(at(9, 0)));
    }

    #[test]
    fn load_merges_missing_platforms_and_drops_unknown_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(APP_STATE_FILE),
            r#"{"apps":{"slack":{"enabled":false,"notifications":true},"imessage":{"enabled":true}},
               "order":["slack","imessage","slack"],
               "settings":{"badgeDockIcon":false}}"#,
        )
        .unwrap();

        let registry = PlatformRegistry::builtin();
        let store = SettingsStore::load(dir.path(), &registry).unwrap();
        let doc = store.app_state();

        assert!(!doc.is_platform_enabled("slack"));
        assert!(doc.is_platform_enabled("teams"));
        assert!(!doc.apps.contains_key("imessage"));
        assert_eq!(doc.order.first().map(String::as_str), Some("slack"));
        assert_eq!(doc.order.len(), registry.len());
        assert!(!doc.settings.badge_dock_icon);
        assert!(doc.settings.global_notifications);
    }

    #[test]
    fn performance_settings_are_clamped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PERFORMANCE_FILE),
            r#"{"maxActiveWebviews":1,"inactivityTimeoutMinutes":0}"#,
        )
        .unwrap();
        let registry = PlatformRegistry::builtin();
        let store = SettingsStore::load(dir.path(), &registry).unwrap();
        assert_eq!(store.performance().max_active_sessions, MIN_MAX_ACTIVE_SESSIONS);
        assert_eq!(store.performance().inactivity_timeout(), Duration::from_secs(60));

        store
            .update_performance(PerformancePatch {
                max_active_sessions: Some(6),
                ..PerformancePatch::default()
            })
            .unwrap();
        let reloaded = SettingsStore::load(dir.path(), &registry).unwrap();
        assert_eq!(reloaded.performance().max_active_sessions, 6);
        assert_eq!(reloaded.performance().inactivity_timeout_minutes, 1);
    }

    #[test]
    fn inactivity_timeout_is_capped_at_a_day() {
        let registry = PlatformRegistry::builtin();
        let store = SettingsStore::in_memory(&registry);
        let updated = store
            .update_performance(PerformancePatch {
                inactivity_timeout_minutes: Some(u64::MAX),
                ..PerformancePatch::default()
            })
            .unwrap();
        assert_eq!(updated.inactivity_timeout_minutes, MAX_INACTIVITY_TIMEOUT_MINUTES);
        assert_eq!(updated.inactivity_timeout(), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn hardware_acceleration_lives_in_performance_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(APP_STATE_FILE),
            r#"{"settings":{"hardwareAcceleration":false,"theme":"dark"}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(PERFORMANCE_FILE),
            r#"{"hardwareAcceleration":false}"#,
        )
        .unwrap();

        let store = SettingsStore::load(dir.path(), &PlatformRegistry::builtin()).unwrap();
        assert_eq!(store.general().theme, "dark");
        assert!(!store.performance().hardware_acceleration);
        let saved = serde_json::to_value(store.general()).unwrap();
        assert!(saved.get("hardwareAcceleration").is_none());
    }

    #[test]
    fn app_state_without_settings_deserializes_with_defaults() {
        let doc: AppStateDoc = serde_json::from_str(r#"{"order":["slack"]}"#).unwrap();
        assert_eq!(doc.settings, GeneralSettings::default());
        assert!(doc.apps.is_empty());

        let registry = PlatformRegistry::builtin();
        let normalized = doc.normalize(&registry);
        assert_eq!(normalized.order.len(), registry.len());
        assert!(normalized.is_platform_enabled("teams"));
    }

    #[test]
    fn order_always_covers_the_registry() {
        let registry = PlatformRegistry::builtin();
        let store = SettingsStore::in_memory(&registry);
        store
            .update_app_state(|doc| doc.order.retain(|id| id != "discord"))
            .unwrap();
        assert_eq!(store.app_state().order.last().map(String::as_str), Some("discord"));

        store.set_platform_enabled("discord", false).unwrap();
        assert!(!store.app_state().is_notifications_enabled("discord"));
        store.set_platform_enabled("discord", true).unwrap();
        assert!(store.app_state().is_notifications_enabled("discord"));
        assert!(store.set_platform_enabled("myspace", true).is_err());
    }
}
