use std::path::{Path, PathBuf};

use chattio_core::{
    storage::write_json_atomic,
    telemetry::{TelemetryExport, TelemetrySummary},
};
use serde::Serialize;
use tauri::{AppHandle, Manager};
use tracing::info;

use crate::{model::ShellState, paths::unix_now_secs};

/// What the diagnostics panel shows besides the telemetry summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RuntimeDiagnostics {
    pub(crate) live_sessions: Vec<String>,
    pub(crate) focused: Option<String>,
    pub(crate) event_count: usize,
    pub(crate) telemetry: TelemetrySummary,
}

pub(crate) fn snapshot_runtime(app: &AppHandle) -> Result<RuntimeDiagnostics, String> {
    let state = app.state::<ShellState>();
    let core = state.core()?;
    let telemetry = core.telemetry();
    Ok(RuntimeDiagnostics {
        live_sessions: core.sessions().live_platforms(),
        focused: core.sessions().focused().map(str::to_string),
        event_count: telemetry.len(),
        telemetry: telemetry.summarize(),
    })
}

pub(crate) fn export_file_name(unix_secs: u64) -> String {
    format!("diagnostics-{unix_secs}.json")
}

fn write_export(dir: &Path, export: &TelemetryExport) -> Result<PathBuf, String> {
    let path = dir.join(export_file_name(unix_now_secs()));
    write_json_atomic(&path, export).map_err(|error| error.to_string())?;
    Ok(path)
}

/// Writes the full telemetry export next to the settings documents and
/// returns its path.
pub(crate) fn export_diagnostics(app: &AppHandle) -> Result<PathBuf, String> {
    let state = app.state::<ShellState>();
    let export = state.core()?.telemetry().export_snapshot();
    let path = write_export(&state.config_dir, &export)?;
    info!(path = %path.display(), events = export.events.len(), "diagnostics exported");
    Ok(path)
}

pub(crate) fn clear_telemetry(app: &AppHandle) -> Result<(), String> {
    let state = app.state::<ShellState>();
    state.core()?.telemetry().clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chattio_core::{telemetry::Telemetry, test_utils::ManualClock, EventBus};

    use super::*;

    #[test]
    fn export_lands_in_a_timestamped_file() {
        assert_eq!(export_file_name(1_700_000_000), "diagnostics-1700000000.json");

        let dir = tempfile::tempdir().expect("tempdir");
        let telemetry = Telemetry::new(Arc::new(ManualClock::new()), EventBus::detached());
        telemetry.track_session_load("slack", 420, true);

        let path = write_export(dir.path(), &telemetry.export_snapshot()).expect("export");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written["events"].as_array().map(Vec::len), Some(1));
        assert!(path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("diagnostics-")));
    }
}
