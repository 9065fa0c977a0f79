pub(crate) const LAUNCH_AGENT_LABEL: &str = "app.chattio.desktop";

pub(crate) const MAIN_WINDOW: &str = "main";
pub(crate) const UI_WEBVIEW: &str = "ui";
pub(crate) const TRAY_ID: &str = "main";

pub(crate) const SIDEBAR_WIDTH: f64 = 72.0;
pub(crate) const DEFAULT_WINDOW_WIDTH: f64 = 1200.0;
pub(crate) const DEFAULT_WINDOW_HEIGHT: f64 = 800.0;
pub(crate) const MIN_WINDOW_WIDTH: f64 = 800.0;
pub(crate) const MIN_WINDOW_HEIGHT: f64 = 600.0;

pub(crate) const TICK_INTERVAL_SECS: u64 = 1;
pub(crate) const TRAY_REFRESH_INTERVAL_SECS: u64 = 5;

pub(crate) const LOG_FILE_PREFIX: &str = "chattio.log";
pub(crate) const LOG_ENV_VAR: &str = "CHATTIO_LOG";
pub(crate) const DEFAULT_LOG_FILTER: &str = "chattio=info,chattio_core=info,warn";
