//! In-memory stand-ins for the session host, the clock and the unread store.
//!
//! Compiled for this crate's tests and, behind the `test-helpers` feature, for
//! dependents that drive an [`AppCore`](crate::AppCore) without a webview.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use chrono::NaiveTime;

use crate::{
    clock::Clock,
    error::{Error, Result},
    host::{SessionHost, SessionLabel},
    registry::PlatformConfig,
    storage::{UnreadCounts, UnreadStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Create { label: SessionLabel, user_agent: Option<String> },
    Load { label: SessionLabel, url: String },
    Reload(SessionLabel),
    GoBack(SessionLabel),
    GoForward(SessionLabel),
    Show(SessionLabel),
    Hide(SessionLabel),
    Destroy(SessionLabel),
    Snapshot(SessionLabel),
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<HostCall>,
    live: BTreeSet<SessionLabel>,
    history: BTreeMap<String, (bool, bool)>,
    fail_creates: bool,
    fail_loads: bool,
}

/// Host that renders nothing and records every call. Clones share state so a
/// test can keep a handle after moving one into the session manager.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut RecordingState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with_state(|state| state.calls.clear());
    }

    pub fn live_labels(&self) -> Vec<SessionLabel> {
        self.with_state(|state| state.live.iter().cloned().collect())
    }

    pub fn is_live(&self, platform: &str) -> bool {
        self.with_state(|state| state.live.iter().any(|label| label.platform == platform))
    }

    /// Sets whether the platform's session can go back / forward.
    pub fn set_history(&self, platform: &str, back: bool, forward: bool) {
        self.with_state(|state| {
            state.history.insert(platform.to_string(), (back, forward));
        });
    }

    pub fn fail_creates(&self, fail: bool) {
        self.with_state(|state| state.fail_creates = fail);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.with_state(|state| state.fail_loads = fail);
    }

    fn record(&self, label: &SessionLabel, call: HostCall) -> Result<()> {
        self.with_state(|state| {
            if !state.live.contains(label) {
                return Err(Error::host(format!("no webview for {label}")));
            }
            state.calls.push(call);
            Ok(())
        })
    }

    fn history(&self, label: &SessionLabel) -> (bool, bool) {
        self.with_state(|state| {
            if !state.live.contains(label) {
                return (false, false);
            }
            state
                .history
                .get(&label.platform)
                .copied()
                .unwrap_or_default()
        })
    }
}

impl SessionHost for RecordingHost {
    fn create(
        &mut self,
        label: &SessionLabel,
        _config: &PlatformConfig,
        user_agent: Option<&str>,
    ) -> Result<()> {
        self.with_state(|state| {
            if state.fail_creates {
                return Err(Error::host("webview creation refused"));
            }
            state.live.insert(label.clone());
            state.calls.push(HostCall::Create {
                label: label.clone(),
                user_agent: user_agent.map(str::to_string),
            });
            Ok(())
        })
    }

    fn load(&mut self, label: &SessionLabel, url: &str) -> Result<()> {
        if self.with_state(|state| state.fail_loads) {
            return Err(Error::host("load refused"));
        }
        self.record(
            label,
            HostCall::Load {
                label: label.clone(),
                url: url.to_string(),
            },
        )
    }

    fn reload(&mut self, label: &SessionLabel) -> Result<()> {
        self.record(label, HostCall::Reload(label.clone()))
    }

    fn can_go_back(&self, label: &SessionLabel) -> bool {
        self.history(label).0
    }

    fn can_go_forward(&self, label: &SessionLabel) -> bool {
        self.history(label).1
    }

    fn go_back(&mut self, label: &SessionLabel) -> Result<()> {
        self.record(label, HostCall::GoBack(label.clone()))
    }

    fn go_forward(&mut self, label: &SessionLabel) -> Result<()> {
        self.record(label, HostCall::GoForward(label.clone()))
    }

    fn show(&mut self, label: &SessionLabel) -> Result<()> {
        self.record(label, HostCall::Show(label.clone()))
    }

    fn hide(&mut self, label: &SessionLabel) -> Result<()> {
        self.record(label, HostCall::Hide(label.clone()))
    }

    fn destroy(&mut self, label: &SessionLabel) -> Result<()> {
        self.with_state(|state| {
            state.live.remove(label);
            state.calls.push(HostCall::Destroy(label.clone()));
        });
        Ok(())
    }

    fn request_snapshot(&mut self, label: &SessionLabel, _script: &str) -> Result<()> {
        self.record(label, HostCall::Snapshot(label.clone()))
    }
}

pub struct ManualClock {
    origin: Instant,
    origin_unix_millis: u64,
    state: Mutex<ManualState>,
}

struct ManualState {
    elapsed: Duration,
    time_of_day: NaiveTime,
}

impl ManualClock {
    /// Starts at noon local time.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            origin_unix_millis: 1_700_000_000_000,
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                time_of_day: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.elapsed += by;
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        state.time_of_day = state.time_of_day.overflowing_add_signed(delta).0;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    pub fn set_time_of_day(&self, hour: u32, minute: u32) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            state.time_of_day = time;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        self.origin + state.elapsed
    }

    fn local_time(&self) -> NaiveTime {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .time_of_day
    }

    fn unix_millis(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        self.origin_unix_millis
            .saturating_add(u64::try_from(state.elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Unread store that keeps counts in memory and counts writes.
#[derive(Default)]
pub struct MemoryUnreadStore {
    counts: Mutex<UnreadCounts>,
    saves: AtomicUsize,
    fail_saves: bool,
}

impl MemoryUnreadStore {
    pub fn with_counts(counts: UnreadCounts) -> Self {
        Self {
            counts: Mutex::new(counts),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> UnreadCounts {
        self.counts
            .lock()
            .map(|counts| counts.clone())
            .unwrap_or_default()
    }
}

impl UnreadStore for MemoryUnreadStore {
    fn load(&self) -> Result<UnreadCounts> {
        Ok(self.counts.lock().map_err(|_| Error::LockPoisoned)?.clone())
    }

    fn save(&self, counts: &UnreadCounts) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(Error::Persist {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "store unavailable"),
            });
        }
        *self.counts.lock().map_err(|_| Error::LockPoisoned)? = counts.clone();
        Ok(())
    }
}
