const COMMANDS: &[&str] = &[
    "list_platforms",
    "activate_platform",
    "prewarm_platform",
    "unload_platform",
    "refresh_platform",
    "navigate_back",
    "navigate_forward",
    "get_unread_summary",
    "reset_unread_counts",
    "load_app_state",
    "set_platform_enabled",
    "set_platform_notifications",
    "save_general_settings",
    "reorder_platforms",
    "reset_settings",
    "load_performance_settings",
    "save_performance_settings",
    "get_do_not_disturb_state",
    "set_do_not_disturb",
    "get_telemetry_summary",
    "export_diagnostics",
    "clear_telemetry",
    "record_telemetry",
    "open_external_url",
    "report_page_snapshot",
];

fn main() {
    tauri_build::try_build(
        tauri_build::Attributes::new()
            .app_manifest(tauri_build::AppManifest::new().commands(COMMANDS)),
    )
    .expect("failed to run tauri-build");
}
