use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use chattio_core::{
    registry::PlatformConfig,
    settings::{AppStateDoc, GeneralSettings, PerformanceSettings},
    AppCore,
};
use serde::{Deserialize, Serialize};
use tauri::menu::MenuItem;

use crate::notifications;

#[derive(Clone)]
pub(crate) struct TrayDndMenuState {
    pub(crate) status_item: MenuItem<tauri::Wry>,
    pub(crate) toggle_item: MenuItem<tauri::Wry>,
}

pub(crate) struct ShellState {
    pub(crate) core: Mutex<AppCore>,
    pub(crate) config_dir: PathBuf,
    pub(crate) tray_dnd_menu: Mutex<Option<TrayDndMenuState>>,
}

impl ShellState {
    pub(crate) fn new(core: AppCore, config_dir: PathBuf) -> Self {
        Self {
            core: Mutex::new(core),
            config_dir,
            tray_dnd_menu: Mutex::new(None),
        }
    }

    pub(crate) fn core(&self) -> Result<MutexGuard<'_, AppCore>, String> {
        self.core
            .lock()
            .map_err(|_| "Core state lock poisoned".to_string())
    }
}

/// Sidebar entry: static platform data merged with the user's toggles.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlatformEntry {
    pub(crate) id: &'static str,
    pub(crate) display_name: &'static str,
    pub(crate) icon: &'static str,
    pub(crate) origin_url: &'static str,
    pub(crate) enabled: bool,
    pub(crate) notifications: bool,
    pub(crate) unread: u32,
    pub(crate) badge: Option<String>,
    pub(crate) live: bool,
    pub(crate) focused: bool,
}

impl PlatformEntry {
    pub(crate) fn new(
        config: &PlatformConfig,
        app_state: &AppStateDoc,
        unread: u32,
        live: bool,
        focused: bool,
    ) -> Self {
        let toggle = app_state.toggle(config.id);
        Self {
            id: config.id,
            display_name: config.display_name,
            icon: config.icon,
            origin_url: config.origin_url,
            enabled: toggle.enabled,
            notifications: toggle.notifications,
            unread,
            badge: notifications::sidebar_badge(unread),
            live,
            focused,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppStateResponse {
    pub(crate) app_state: AppStateDoc,
    pub(crate) performance: PerformanceSettings,
    pub(crate) do_not_disturb_active: bool,
}

/// Partial update of the general settings sent by the settings UI; absent
/// fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct GeneralSettingsPatch {
    pub(crate) theme: Option<String>,
    pub(crate) sidebar_density: Option<String>,
    pub(crate) global_notifications: Option<bool>,
    pub(crate) badge_dock_icon: Option<bool>,
    pub(crate) notification_preview: Option<bool>,
    pub(crate) notification_sounds: Option<bool>,
    pub(crate) show_welcome: Option<bool>,
    pub(crate) launch_at_login: Option<bool>,
    pub(crate) sidebar_collapsed: Option<bool>,
    pub(crate) do_not_disturb: Option<bool>,
    pub(crate) do_not_disturb_schedule: Option<bool>,
    pub(crate) do_not_disturb_start: Option<String>,
    pub(crate) do_not_disturb_end: Option<String>,
}

impl GeneralSettingsPatch {
    pub(crate) fn apply(self, general: &mut GeneralSettings) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    general.$field = value;
                })*
            };
        }
        merge!(
            theme,
            sidebar_density,
            global_notifications,
            badge_dock_icon,
            notification_preview,
            notification_sounds,
            show_welcome,
            launch_at_login,
            sidebar_collapsed,
            do_not_disturb,
            do_not_disturb_schedule,
            do_not_disturb_start,
            do_not_disturb_end,
        );
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DndStateResponse {
    pub(crate) manual: bool,
    pub(crate) scheduled: bool,
    pub(crate) active: bool,
    pub(crate) start: String,
    pub(crate) end: String,
}

impl DndStateResponse {
    pub(crate) fn from_general(general: &GeneralSettings) -> Self {
        Self {
            manual: general.do_not_disturb,
            scheduled: general.do_not_disturb_schedule,
            active: general.is_do_not_disturb_active(chrono::Local::now().time()),
            start: general.do_not_disturb_start.clone(),
            end: general.do_not_disturb_end.clone(),
        }
    }
}
