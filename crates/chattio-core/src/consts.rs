pub const APP_STATE_FILE: &str = "app-state.json";
pub const UNREAD_STATE_FILE: &str = "unread-state.json";
pub const PERFORMANCE_FILE: &str = "performance.json";

pub const DEFAULT_MAX_ACTIVE_SESSIONS: usize = 3;
pub const MIN_MAX_ACTIVE_SESSIONS: usize = 2;
pub const DEFAULT_INACTIVITY_TIMEOUT_MINUTES: u64 = 5;
pub const MIN_INACTIVITY_TIMEOUT_MINUTES: u64 = 1;
pub const MAX_INACTIVITY_TIMEOUT_MINUTES: u64 = 24 * 60;

pub const NOTIFICATION_COOLDOWN_SECS: u64 = 5;
pub const TITLE_POLL_INTERVAL_SECS: u64 = 5;
pub const CRASH_RELOAD_DELAY_SECS: u64 = 2;
pub const CRASH_RETRY_LIMIT: u32 = 3;
/// A crash further than this from the previous one starts a fresh retry budget.
pub const CRASH_STABLE_WINDOW_SECS: u64 = 60;
pub const CONNECTION_REFUSED_RETRY_SECS: u64 = 3;

pub const TELEMETRY_CAPACITY: usize = 1000;

pub const PERSIST_MAX_ATTEMPTS: u32 = 3;
pub const PERSIST_RETRY_DELAY_MS: u64 = 100;

pub const DEFAULT_DND_START: &str = "22:00";
pub const DEFAULT_DND_END: &str = "08:00";

pub const NOTIFICATION_TITLE: &str = "New Messages";

pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
