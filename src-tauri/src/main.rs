#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod consts;
mod diagnostics;
mod dnd;
mod host;
mod logging;
mod model;
mod notifications;
mod paths;
mod settings;
mod ui_shell;

use std::time::{Duration, Instant};

use chattio_core::{
    events::EventReceiver,
    host::HostEvent,
    settings::{AppStateDoc, GeneralSettings, PerformancePatch, PerformanceSettings},
    telemetry::TelemetryReport,
    unread::UnreadSummary,
    AppCore, AppEvent, EventBus,
};
use tauri::menu::{Menu, MenuItem, PredefinedMenuItem};
use tauri::tray::{MouseButton, MouseButtonState, TrayIconEvent};
use tauri::webview::WebviewBuilder;
use tauri::{
    AppHandle, Emitter, LogicalPosition, LogicalSize, Manager, State, Webview, WebviewUrl,
};
use tracing::{debug, error, info, warn};

use crate::{
    consts::{
        DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH, MAIN_WINDOW, MIN_WINDOW_HEIGHT,
        MIN_WINDOW_WIDTH, SIDEBAR_WIDTH, TICK_INTERVAL_SECS, TRAY_ID, TRAY_REFRESH_INTERVAL_SECS,
        UI_WEBVIEW,
    },
    host::{dispatch_host_event, TauriSessionHost},
    model::{
        AppStateResponse, DndStateResponse, GeneralSettingsPatch, PlatformEntry, ShellState,
    },
};

fn with_core<T>(
    state: &ShellState,
    op: impl FnOnce(&mut AppCore) -> chattio_core::Result<T>,
) -> Result<T, String> {
    let mut core = state.core()?;
    op(&mut core).map_err(|error| error.to_string())
}

#[tauri::command]
async fn list_platforms(state: State<'_, ShellState>) -> Result<Vec<PlatformEntry>, String> {
    let core = state.core()?;
    let app_state = core.settings().app_state();
    let sessions = core.sessions();
    let entries = app_state
        .order
        .iter()
        .filter_map(|id| core.registry().get(id))
        .map(|config| {
            PlatformEntry::new(
                config,
                &app_state,
                core.unread().count(config.id),
                sessions.is_live(config.id),
                sessions.focused() == Some(config.id),
            )
        })
        .collect();
    Ok(entries)
}

#[tauri::command]
async fn activate_platform(state: State<'_, ShellState>, platform_id: String) -> Result<(), String> {
    with_core(&state, |core| core.activate(&platform_id))
}

#[tauri::command]
async fn prewarm_platform(state: State<'_, ShellState>, platform_id: String) -> Result<(), String> {
    with_core(&state, |core| core.prewarm(&platform_id))
}

#[tauri::command]
async fn unload_platform(state: State<'_, ShellState>, platform_id: String) -> Result<bool, String> {
    with_core(&state, |core| Ok(core.unload(&platform_id)))
}

#[tauri::command]
async fn refresh_platform(
    state: State<'_, ShellState>,
    platform_id: Option<String>,
) -> Result<(), String> {
    with_core(&state, |core| core.refresh(platform_id.as_deref()))
}

#[tauri::command]
async fn navigate_back(
    state: State<'_, ShellState>,
    platform_id: Option<String>,
) -> Result<bool, String> {
    with_core(&state, |core| Ok(core.navigate_back(platform_id.as_deref())))
}

#[tauri::command]
async fn navigate_forward(
    state: State<'_, ShellState>,
    platform_id: Option<String>,
) -> Result<bool, String> {
    with_core(&state, |core| Ok(core.navigate_forward(platform_id.as_deref())))
}

#[tauri::command]
async fn get_unread_summary(state: State<'_, ShellState>) -> Result<UnreadSummary, String> {
    with_core(&state, |core| Ok(core.summary()))
}

#[tauri::command]
async fn reset_unread_counts(state: State<'_, ShellState>) -> Result<(), String> {
    with_core(&state, |core| {
        core.reset_unread();
        Ok(())
    })
}

#[tauri::command]
async fn load_app_state(state: State<'_, ShellState>) -> Result<AppStateResponse, String> {
    with_core(&state, |core| {
        let app_state = core.settings().app_state();
        let do_not_disturb_active = app_state
            .settings
            .is_do_not_disturb_active(chrono::Local::now().time());
        Ok(AppStateResponse {
            performance: core.settings().performance(),
            app_state,
            do_not_disturb_active,
        })
    })
}

#[tauri::command]
async fn set_platform_enabled(
    state: State<'_, ShellState>,
    platform_id: String,
    enabled: bool,
) -> Result<AppStateDoc, String> {
    with_core(&state, |core| core.set_platform_enabled(&platform_id, enabled))
}

#[tauri::command]
async fn set_platform_notifications(
    state: State<'_, ShellState>,
    platform_id: String,
    enabled: bool,
) -> Result<AppStateDoc, String> {
    with_core(&state, |core| {
        core.set_platform_notifications(&platform_id, enabled)
    })
}

#[tauri::command]
async fn save_general_settings(
    app: AppHandle,
    state: State<'_, ShellState>,
    patch: GeneralSettingsPatch,
) -> Result<GeneralSettings, String> {
    let (before, general) = with_core(&state, |core| {
        let before = core.settings().general();
        let general = core.update_general(|general| patch.apply(general))?;
        Ok((before, general))
    })?;

    if before.launch_at_login != general.launch_at_login {
        if let Err(error) = settings::apply_launch_at_login(general.launch_at_login) {
            warn!(%error, "failed to apply launch-at-login change");
        }
    }
    dnd::apply_dnd_state_to_tray(&app, &DndStateResponse::from_general(&general));
    Ok(general)
}

#[tauri::command]
async fn reorder_platforms(
    state: State<'_, ShellState>,
    order: Vec<String>,
) -> Result<AppStateDoc, String> {
    with_core(&state, |core| core.reorder(order))
}

#[tauri::command]
async fn reset_settings(app: AppHandle, state: State<'_, ShellState>) -> Result<AppStateDoc, String> {
    let doc = with_core(&state, |core| core.reset_settings())?;
    dnd::apply_dnd_state_to_tray(&app, &DndStateResponse::from_general(&doc.settings));
    Ok(doc)
}

#[tauri::command]
async fn load_performance_settings(
    state: State<'_, ShellState>,
) -> Result<PerformanceSettings, String> {
    with_core(&state, |core| Ok(core.settings().performance()))
}

#[tauri::command]
async fn save_performance_settings(
    state: State<'_, ShellState>,
    patch: PerformancePatch,
) -> Result<PerformanceSettings, String> {
    let (before, performance) = with_core(&state, |core| {
        let before = core.settings().performance();
        let performance = core.update_performance(patch)?;
        Ok((before, performance))
    })?;
    if before.hardware_acceleration != performance.hardware_acceleration {
        info!(
            enabled = performance.hardware_acceleration,
            "hardware acceleration change applies after restart"
        );
    }
    Ok(performance)
}

#[tauri::command]
async fn get_do_not_disturb_state(app: AppHandle) -> Result<DndStateResponse, String> {
    dnd::current_state(&app)
}

#[tauri::command]
async fn set_do_not_disturb(app: AppHandle, enabled: bool) -> Result<DndStateResponse, String> {
    dnd::set_do_not_disturb(&app, enabled)
}

#[tauri::command]
async fn get_telemetry_summary(
    app: AppHandle,
) -> Result<diagnostics::RuntimeDiagnostics, String> {
    diagnostics::snapshot_runtime(&app)
}

#[tauri::command]
async fn export_diagnostics(app: AppHandle) -> Result<String, String> {
    let path = diagnostics::export_diagnostics(&app)?;
    Ok(path.to_string_lossy().to_string())
}

#[tauri::command]
async fn clear_telemetry(app: AppHandle) -> Result<(), String> {
    diagnostics::clear_telemetry(&app)
}

#[tauri::command]
async fn record_telemetry(
    state: State<'_, ShellState>,
    report: TelemetryReport,
) -> Result<(), String> {
    with_core(&state, |core| {
        core.telemetry().record_report(report);
        Ok(())
    })
}

#[tauri::command]
fn open_external_url(url: String) -> Result<(), String> {
    ui_shell::open_external_url(&url)
}

/// Called by the unread probe injected into each session.
#[tauri::command]
fn report_page_snapshot(app: AppHandle, webview: Webview, snapshot: String) {
    dispatch_host_event(
        &app,
        webview.label(),
        HostEvent::SnapshotReported { raw: snapshot },
    );
}

fn forward_event(app: &AppHandle, event: AppEvent) {
    if let Err(error) = app.emit_to(UI_WEBVIEW, "app-event", &event) {
        debug!(%error, "failed to emit app-event");
    }
    match event {
        AppEvent::UnreadSummary(summary) => notifications::apply_badge(app, &summary),
        AppEvent::Notification(notification) => {
            notifications::show_notification(app, notification)
        }
        AppEvent::OpenExternal { platform, url } => {
            if let Err(error) = ui_shell::open_external_url(&url) {
                warn!(platform = %platform, url = %url, %error, "failed to open external link");
            }
        }
        AppEvent::SessionState(_) | AppEvent::Telemetry(_) => {}
    }
}

fn spawn_event_forwarder(app: AppHandle, mut events: EventReceiver) {
    tauri::async_runtime::spawn(async move {
        while let Some(event) = events.recv().await {
            forward_event(&app, event);
        }
        debug!("event forwarder stopped");
    });
}

fn spawn_tick_loop(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(TICK_INTERVAL_SECS)).await;
            let Some(state) = app.try_state::<ShellState>() else {
                continue;
            };
            if let Err(error) = with_core(&state, |core| {
                core.tick();
                Ok(())
            }) {
                warn!(%error, "session tick skipped");
            }
        }
    });
}

fn spawn_tray_refresh_loop(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        loop {
            dnd::refresh_tray(&app);
            tokio::time::sleep(Duration::from_secs(TRAY_REFRESH_INTERVAL_SECS)).await;
        }
    });
}

fn handle_tray_menu_event(app: &AppHandle, id: &str) {
    match id {
        "open_window" => ui_shell::show_main_window(app),
        dnd::DND_TOGGLE_ID => {
            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(error) = dnd::toggle_do_not_disturb(&app) {
                    warn!(%error, "failed to toggle do not disturb");
                }
            });
        }
        "mark_all_read" => {
            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                let state = app.state::<ShellState>();
                if let Err(error) = with_core(&state, |core| {
                    core.reset_unread();
                    Ok(())
                }) {
                    warn!(%error, "failed to reset unread counts");
                }
            });
        }
        "quit" => {
            let app = app.clone();
            tauri::async_runtime::spawn(async move {
                let state = app.state::<ShellState>();
                if let Err(error) = with_core(&state, |core| {
                    core.shutdown();
                    Ok(())
                }) {
                    warn!(%error, "shutdown skipped");
                }
                info!("quitting");
                app.exit(0);
            });
        }
        _ => {}
    }
}

fn setup_tray(app: &AppHandle) -> tauri::Result<()> {
    let Some(tray) = app.tray_by_id(TRAY_ID) else {
        warn!("tray icon not configured");
        return Ok(());
    };

    let dnd_items = dnd::create_dnd_menu_items(app)?;
    let open_item = MenuItem::with_id(app, "open_window", "Open Chattio", true, None::<&str>)?;
    let mark_read_item =
        MenuItem::with_id(app, "mark_all_read", "Mark All as Read", true, None::<&str>)?;
    let quit_item = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
    let menu = Menu::with_items(
        app,
        &[
            &dnd_items.status_item,
            &dnd_items.toggle_item,
            &PredefinedMenuItem::separator(app)?,
            &open_item,
            &mark_read_item,
            &PredefinedMenuItem::separator(app)?,
            &quit_item,
        ],
    )?;
    dnd::install_dnd_menu_state(app, dnd_items);

    tray.set_menu(Some(menu))?;
    tray.set_show_menu_on_left_click(false)?;
    tray.on_tray_icon_event(|tray, event| {
        if let TrayIconEvent::Click {
            button: MouseButton::Left,
            button_state: MouseButtonState::Up,
            ..
        } = event
        {
            ui_shell::toggle_main_window(tray.app_handle());
        }
    });
    tray.on_menu_event(|app, event| handle_tray_menu_event(app, event.id().as_ref()));
    Ok(())
}

fn create_main_window(app: &AppHandle) -> tauri::Result<()> {
    let window = tauri::WindowBuilder::new(app, MAIN_WINDOW)
        .title("Chattio")
        .inner_size(DEFAULT_WINDOW_WIDTH, DEFAULT_WINDOW_HEIGHT)
        .min_inner_size(MIN_WINDOW_WIDTH, MIN_WINDOW_HEIGHT)
        .build()?;
    let (position, size) = ui_shell::sidebar_bounds(&window).unwrap_or((
        LogicalPosition::new(0.0, 0.0),
        LogicalSize::new(SIDEBAR_WIDTH, DEFAULT_WINDOW_HEIGHT),
    ));
    window.add_child(
        WebviewBuilder::new(UI_WEBVIEW, WebviewUrl::App("index.html".into())),
        position,
        size,
    )?;
    Ok(())
}

/// Focuses the remembered platform once the window exists.
fn spawn_initial_focus(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let state = app.state::<ShellState>();
        match with_core(&state, |core| core.start()) {
            Ok(Some(platform)) => info!(platform, "initial platform focused"),
            Ok(None) => info!("no platform enabled"),
            Err(error) => error!(%error, "failed to focus initial platform"),
        }
    });
}

fn main() {
    let launched_at = Instant::now();
    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            list_platforms,
            activate_platform,
            prewarm_platform,
            unload_platform,
            refresh_platform,
            navigate_back,
            navigate_forward,
            get_unread_summary,
            reset_unread_counts,
            load_app_state,
            set_platform_enabled,
            set_platform_notifications,
            save_general_settings,
            reorder_platforms,
            reset_settings,
            load_performance_settings,
            save_performance_settings,
            get_do_not_disturb_state,
            set_do_not_disturb,
            get_telemetry_summary,
            export_diagnostics,
            clear_telemetry,
            record_telemetry,
            open_external_url,
            report_page_snapshot
        ])
        .setup(move |app| {
            let handle = app.handle().clone();
            match paths::log_dir(&handle).and_then(|dir| logging::init(&dir)) {
                Ok(guard) => {
                    app.manage(guard);
                }
                Err(error) => eprintln!("chattio: logging disabled: {error}"),
            }

            let config_dir = paths::config_dir(&handle)?;
            let (events, receiver) = EventBus::channel();
            let host = TauriSessionHost::new(handle.clone());
            let core = AppCore::open(&config_dir, Box::new(host), events)
                .map_err(|error| format!("Failed to open app state: {error}"))?;

            let general = core.settings().general();
            settings::apply_hardware_acceleration(&core.settings().performance());
            if let Err(error) = settings::apply_launch_at_login(general.launch_at_login) {
                warn!(%error, "failed to configure launch at login");
            }
            app.manage(ShellState::new(core, config_dir));

            create_main_window(&handle)?;
            setup_tray(&handle)?;

            spawn_event_forwarder(handle.clone(), receiver);
            spawn_tick_loop(handle.clone());
            spawn_tray_refresh_loop(handle.clone());
            spawn_initial_focus(handle);

            let startup_ms = launched_at.elapsed().as_secs_f64() * 1000.0;
            if let Ok(core) = app.state::<ShellState>().core() {
                core.telemetry().track_metric(
                    "startup_ms",
                    startup_ms,
                    serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
                );
            }
            info!(startup_ms, "setup complete");
            Ok(())
        })
        .on_window_event(ui_shell::handle_window_event)
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chattio_core::{
        registry::PlatformRegistry,
        settings::SettingsStore,
        test_utils::{ManualClock, MemoryUnreadStore, RecordingHost},
    };

    use super::*;

    fn shell_state() -> ShellState {
        let registry = PlatformRegistry::builtin();
        let settings = Arc::new(SettingsStore::in_memory(&registry));
        let core = AppCore::new(
            registry,
            settings,
            Box::new(MemoryUnreadStore::default()),
            Box::new(RecordingHost::new()),
            Arc::new(ManualClock::new()),
            EventBus::detached(),
        );
        ShellState::new(core, std::env::temp_dir())
    }

    #[test]
    fn with_core_maps_core_errors_to_strings() {
        let state = shell_state();
        let result = with_core(&state, |core| core.activate("myspace"));
        assert_eq!(result, Err("Unknown platform: myspace".to_string()));
    }

    #[test]
    fn frontend_metrics_land_in_the_telemetry_summary() {
        let state = shell_state();
        let report: TelemetryReport = serde_json::from_str(
            r#"{"type":"performance_metric","metric_name":"sidebar_first_render_ms","value":18.0}"#,
        )
        .expect("report");
        with_core(&state, |core| {
            core.telemetry().record_report(report);
            Ok(())
        })
        .expect("record");

        let summary = with_core(&state, |core| Ok(core.telemetry().summarize())).expect("summary");
        assert_eq!(summary.by_type.get("performance_metric"), Some(&1));
    }

    #[test]
    fn general_patch_only_touches_sent_fields() {
        let state = shell_state();
        let patch: GeneralSettingsPatch =
            serde_json::from_str(r#"{"theme":"dark","doNotDisturbStart":"21:30"}"#)
                .expect("patch");
        let general = with_core(&state, |core| core.update_general(|g| patch.apply(g)))
            .expect("update");
        assert_eq!(general.theme, "dark");
        assert_eq!(general.do_not_disturb_start, "21:30");
        assert!(general.global_notifications);
        assert_eq!(general.do_not_disturb_end, "08:00");
    }
}
