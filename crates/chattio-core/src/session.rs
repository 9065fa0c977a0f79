//! Lifecycle of embedded platform sessions.
//!
//! Sessions are created lazily on activation, hidden when another platform is
//! focused and destroyed once they have been inactive for the configured
//! timeout or when the live count exceeds the session limit. All timers are
//! deadlines checked by [`SessionManager::tick`], so every check-then-destroy
//! happens inside one synchronous call.

use std::{collections::BTreeMap, sync::Arc, time::Duration, time::Instant};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    consts::{
        CHROME_USER_AGENT, CONNECTION_REFUSED_RETRY_SECS, CRASH_RELOAD_DELAY_SECS,
        CRASH_RETRY_LIMIT, CRASH_STABLE_WINDOW_SECS, TITLE_POLL_INTERVAL_SECS,
    },
    detector::probe_script,
    error::{Error, Result},
    events::{AppEvent, EventBus},
    host::{HostEvent, SessionHost, SessionLabel},
    navigation::{NavigationDecision, NavigationPolicy},
    registry::{PlatformConfig, PlatformRegistry},
    settings::SettingsStore,
    telemetry::{RecycleReason, Telemetry},
};

/// Chromium net error for a navigation replaced before it finished.
const NET_ERR_ABORTED: i32 = -3;
const NET_ERR_NETWORK_CHANGED: i32 = -21;
const NET_ERR_CONNECTION_REFUSED: i32 = -102;
const BENIGN_LOAD_ERRORS: &[i32] = &[NET_ERR_ABORTED, NET_ERR_NETWORK_CHANGED];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Materialised but no URL assigned yet.
    Unloaded,
    Loading,
    Ready,
    /// Load failed or the crash retry budget ran out; a manual refresh recovers.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateChange {
    pub platform: String,
    /// `false` once the session has been evicted.
    pub live: bool,
    pub focused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SessionPhase>,
}

/// Page data the detector should look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    Title(String),
    Report(String),
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub label: SessionLabel,
    pub config: PlatformConfig,
    pub policy: NavigationPolicy,
    pub last_active_at: Instant,
    pub is_loaded: bool,
    pub phase: SessionPhase,
    pub unresponsive: bool,
    load_started_at: Option<Instant>,
    eviction_due_at: Option<Instant>,
    poll_due_at: Option<Instant>,
    reload_due_at: Option<Instant>,
    crash_count: u32,
    last_crash_at: Option<Instant>,
    refused_retry_used: bool,
}

impl SessionRecord {
    fn new(label: SessionLabel, config: PlatformConfig, now: Instant) -> Self {
        Self {
            label,
            policy: NavigationPolicy::for_platform(&config),
            config,
            last_active_at: now,
            is_loaded: false,
            phase: SessionPhase::Unloaded,
            unresponsive: false,
            load_started_at: None,
            eviction_due_at: None,
            poll_due_at: None,
            reload_due_at: None,
            crash_count: 0,
            last_crash_at: None,
            refused_retry_used: false,
        }
    }

    pub fn eviction_pending(&self) -> bool {
        self.eviction_due_at.is_some()
    }

    pub fn crash_count(&self) -> u32 {
        self.crash_count
    }

    fn touch(&mut self, now: Instant) {
        self.last_active_at = self.last_active_at.max(now);
    }

    fn elapsed_load_ms(&mut self, now: Instant) -> u64 {
        self.load_started_at.take().map_or(0, |started| {
            u64::try_from(now.saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX)
        })
    }
}

pub struct SessionManager {
    registry: PlatformRegistry,
    host: Box<dyn SessionHost>,
    clock: Arc<dyn Clock>,
    settings: Arc<SettingsStore>,
    telemetry: Arc<Telemetry>,
    events: EventBus,
    records: BTreeMap<String, SessionRecord>,
    focused: Option<String>,
    next_generation: u64,
}

impl SessionManager {
    pub fn new(
        registry: &PlatformRegistry,
        host: Box<dyn SessionHost>,
        clock: Arc<dyn Clock>,
        settings: Arc<SettingsStore>,
        telemetry: Arc<Telemetry>,
        events: EventBus,
    ) -> Self {
        Self {
            registry: registry.clone(),
            host,
            clock,
            settings,
            telemetry,
            events,
            records: BTreeMap::new(),
            focused: None,
            next_generation: 1,
        }
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn record(&self, platform: &str) -> Option<&SessionRecord> {
        self.records.get(platform)
    }

    pub fn is_live(&self, platform: &str) -> bool {
        self.records.contains_key(platform)
    }

    pub fn live_platforms(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Focuses a platform, creating and loading its session if needed.
    /// Activating the already-focused platform only refreshes its recency.
    pub fn activate(&mut self, platform: &str) -> Result<()> {
        let config = self.registry.require(platform)?.clone();
        if !self.settings.app_state().is_platform_enabled(platform) {
            return Err(Error::invalid_setting(platform, "platform is disabled"));
        }
        let now = self.clock.now();

        if self.focused.as_deref() == Some(platform) {
            if let Some(record) = self.records.get_mut(platform) {
                record.touch(now);
                record.eviction_due_at = None;
                if !record.is_loaded {
                    self.load(platform);
                }
                return Ok(());
            }
        }

        if !self.records.contains_key(platform) {
            self.materialize(&config, now)?;
        }

        if let Some(previous) = self.focused.take() {
            self.defocus(&previous, now);
        }

        let Some(record) = self.records.get_mut(platform) else {
            return Err(Error::SessionNotFound(platform.to_string()));
        };
        record.touch(now);
        record.eviction_due_at = None;
        let needs_load = !record.is_loaded;
        if let Err(err) = self.host.show(&record.label) {
            warn!(platform, error = %err, "failed to show session");
        }
        self.focused = Some(platform.to_string());
        debug!(platform, "session focused");

        if needs_load {
            self.load(platform);
        }
        self.enforce_session_limit(platform);
        self.publish_state(platform);
        Ok(())
    }

    /// Creates and loads a session in the background without focusing it.
    pub fn prewarm(&mut self, platform: &str) -> Result<()> {
        let config = self.registry.require(platform)?.clone();
        if self.records.contains_key(platform) {
            return Ok(());
        }
        let now = self.clock.now();
        self.materialize(&config, now)?;
        let due = self.eviction_deadline(now);
        if let Some(record) = self.records.get_mut(platform) {
            record.eviction_due_at = due;
        }
        self.load(platform);
        self.enforce_session_limit(platform);
        self.publish_state(platform);
        Ok(())
    }

    /// Destroys a session on request. Returns `false` when none was live.
    pub fn unload(&mut self, platform: &str) -> bool {
        if self.focused.as_deref() == Some(platform) {
            self.focused = None;
        }
        self.evict(platform, RecycleReason::Manual)
    }

    /// Reloads the session, or loads it for the first time if it never was.
    /// Without an id the focused session is used.
    pub fn refresh(&mut self, platform: Option<&str>) -> Result<()> {
        let platform = self.target(platform)?;
        let now = self.clock.now();
        let record = self
            .records
            .get_mut(&platform)
            .ok_or_else(|| Error::SessionNotFound(platform.clone()))?;
        record.crash_count = 0;
        record.reload_due_at = None;

        if !record.is_loaded {
            self.load(&platform);
            return Ok(());
        }

        record.phase = SessionPhase::Loading;
        record.load_started_at = Some(now);
        self.host.reload(&record.label)?;
        info!(platform = %platform, "session refreshed");
        Ok(())
    }

    pub fn navigate_back(&mut self, platform: Option<&str>) -> bool {
        self.step_history(platform, true)
    }

    pub fn navigate_forward(&mut self, platform: Option<&str>) -> bool {
        self.step_history(platform, false)
    }

    /// Loads `url` in the session if the navigation policy keeps it there;
    /// otherwise it is handed to the external browser.
    pub fn navigate(&mut self, platform: &str, url: &str) -> Result<NavigationDecision> {
        let record = self
            .records
            .get_mut(platform)
            .ok_or_else(|| Error::SessionNotFound(platform.to_string()))?;
        let decision = record.policy.decide_navigation(url);
        match &decision {
            NavigationDecision::Allow => {
                record.is_loaded = true;
                record.phase = SessionPhase::Loading;
                record.load_started_at = Some(self.clock.now());
                self.host.load(&record.label, url)?;
            }
            NavigationDecision::OpenExternal(target) => {
                self.open_external(platform, target.as_str());
            }
            NavigationDecision::Deny => {
                return Err(Error::InvalidUrl {
                    url: url.to_string(),
                    reason: "blocked by navigation policy".to_string(),
                });
            }
        }
        Ok(decision)
    }

    /// Fires due timers: inactivity eviction, delayed reloads and the
    /// detection poll.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        let due_evictions: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.eviction_due_at.is_some_and(|due| due <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for platform in due_evictions {
            self.evict_if_inactive(&platform, now);
        }

        let due_reloads: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.reload_due_at.is_some_and(|due| due <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for platform in due_reloads {
            self.retry_load(&platform, now);
        }

        let due_polls: Vec<String> = self
            .records
            .iter()
            .filter(|(_, record)| record.poll_due_at.is_some_and(|due| due <= now))
            .map(|(id, _)| id.clone())
            .collect();
        for platform in due_polls {
            if let Some(record) = self.records.get_mut(&platform) {
                record.poll_due_at = Some(now + Duration::from_secs(TITLE_POLL_INTERVAL_SECS));
            }
            self.request_probe(&platform);
        }
    }

    /// Applies an event from a hosted page. Events from a destroyed or
    /// replaced session are dropped.
    pub fn handle_event(&mut self, label: &SessionLabel, event: HostEvent) -> Option<PageSignal> {
        let now = self.clock.now();
        let platform = label.platform.as_str();
        let Some(record) = self
            .records
            .get_mut(platform)
            .filter(|record| record.label.generation == label.generation)
        else {
            debug!(%label, ?event, "dropping event for stale session");
            return None;
        };

        match event {
            HostEvent::LoadStarted => {
                record.phase = SessionPhase::Loading;
                record.load_started_at.get_or_insert(now);
                None
            }
            HostEvent::LoadFinished => {
                let elapsed = record.elapsed_load_ms(now);
                record.phase = SessionPhase::Ready;
                record.refused_retry_used = false;
                record.poll_due_at = Some(now + Duration::from_secs(TITLE_POLL_INTERVAL_SECS));
                debug!(platform, elapsed_ms = elapsed, "session loaded");
                self.telemetry.track_session_load(platform, elapsed, true);
                self.request_probe(platform);
                self.publish_state(platform);
                None
            }
            HostEvent::LoadFailed { code, description } => {
                self.handle_load_failure(platform, code, &description, now);
                None
            }
            HostEvent::TitleChanged { title } => {
                if record.config.probe.is_title_only() {
                    Some(PageSignal::Title(title))
                } else {
                    self.request_probe(platform);
                    None
                }
            }
            HostEvent::SnapshotReported { raw } => Some(PageSignal::Report(raw)),
            HostEvent::NavigationRequested { url } => {
                match record.policy.decide_navigation(&url) {
                    NavigationDecision::Allow => {}
                    NavigationDecision::OpenExternal(target) => {
                        self.open_external(platform, target.as_str())
                    }
                    NavigationDecision::Deny => debug!(platform, url = %url, "navigation denied"),
                }
                None
            }
            HostEvent::NewWindowRequested { url } => {
                match record.policy.decide_new_window(&url) {
                    NavigationDecision::OpenExternal(target) => {
                        self.open_external(platform, target.as_str())
                    }
                    _ => debug!(platform, url = %url, "pop-up denied"),
                }
                None
            }
            HostEvent::Crashed { reason } => {
                self.handle_crash(platform, &reason, now);
                None
            }
            HostEvent::Unresponsive => {
                record.unresponsive = true;
                warn!(platform, "session unresponsive");
                self.telemetry
                    .track_error(platform, "unresponsive", serde_json::Value::Null);
                None
            }
            HostEvent::Responsive => {
                if record.unresponsive {
                    info!(platform, "session responsive again");
                }
                record.unresponsive = false;
                None
            }
            HostEvent::ConsoleMessage { level, message } => {
                debug!(platform, level, "console: {message}");
                None
            }
        }
    }

    /// Destroys every session.
    pub fn shutdown(&mut self) {
        self.focused = None;
        for (platform, record) in std::mem::take(&mut self.records) {
            if let Err(err) = self.host.destroy(&record.label) {
                warn!(platform = %platform, error = %err, "failed to destroy session");
            }
        }
        info!("all sessions destroyed");
    }

    fn target(&self, platform: Option<&str>) -> Result<String> {
        platform
            .or(self.focused.as_deref())
            .map(str::to_string)
            .ok_or_else(|| Error::SessionNotFound("no focused session".to_string()))
    }

    fn materialize(&mut self, config: &PlatformConfig, now: Instant) -> Result<()> {
        let label = SessionLabel::new(config.id, self.next_generation);
        self.next_generation += 1;
        let user_agent = config.requires_custom_user_agent.then_some(CHROME_USER_AGENT);
        self.host.create(&label, config, user_agent)?;
        info!(platform = config.id, generation = label.generation, "session created");
        self.records.insert(
            config.id.to_string(),
            SessionRecord::new(label, config.clone(), now),
        );
        Ok(())
    }

    fn load(&mut self, platform: &str) {
        let now = self.clock.now();
        let Some(record) = self.records.get_mut(platform) else {
            return;
        };
        record.is_loaded = true;
        record.phase = SessionPhase::Loading;
        record.load_started_at = Some(now);
        if let Err(err) = self.host.load(&record.label, record.config.origin_url) {
            warn!(platform, error = %err, "failed to start session load");
            record.is_loaded = false;
            record.phase = SessionPhase::Failed;
            record.load_started_at = None;
            self.telemetry
                .track_error(platform, "load_error", json!({ "message": err.to_string() }));
        }
    }

    /// A deadline past what `Instant` can represent means the session is
    /// never evicted for inactivity.
    fn eviction_deadline(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.settings.performance().inactivity_timeout())
    }

    fn defocus(&mut self, platform: &str, now: Instant) {
        let due = self.eviction_deadline(now);
        if let Some(record) = self.records.get_mut(platform) {
            record.eviction_due_at = due;
            if let Err(err) = self.host.hide(&record.label) {
                warn!(platform, error = %err, "failed to hide session");
            }
        }
        self.publish_state(platform);
    }

    fn evict_if_inactive(&mut self, platform: &str, now: Instant) {
        if self.focused.as_deref() == Some(platform) {
            let due = self.eviction_deadline(now);
            if let Some(record) = self.records.get_mut(platform) {
                record.eviction_due_at = due;
            }
            debug!(platform, "focused session kept, eviction re-armed");
            return;
        }
        self.evict(platform, RecycleReason::Inactivity);
    }

    fn enforce_session_limit(&mut self, protect: &str) {
        let limit = self.settings.performance().max_active_sessions;
        while self.records.len() > limit {
            let victim = self
                .records
                .iter()
                .filter(|(id, _)| {
                    id.as_str() != protect && self.focused.as_deref() != Some(id.as_str())
                })
                .min_by_key(|(_, record)| record.last_active_at)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                break;
            };
            self.evict(&victim, RecycleReason::SessionLimit);
        }
    }

    fn evict(&mut self, platform: &str, reason: RecycleReason) -> bool {
        let Some(record) = self.records.remove(platform) else {
            return false;
        };
        if let Err(err) = self.host.destroy(&record.label) {
            warn!(platform, error = %err, "failed to destroy session");
        }
        self.telemetry.track_recycle(platform, reason);
        self.publish_state(platform);
        true
    }

    fn retry_load(&mut self, platform: &str, now: Instant) {
        let Some(record) = self.records.get_mut(platform) else {
            return;
        };
        record.reload_due_at = None;
        if !record.is_loaded {
            self.load(platform);
            return;
        }
        record.phase = SessionPhase::Loading;
        record.load_started_at = Some(now);
        if let Err(err) = self.host.reload(&record.label) {
            warn!(platform, error = %err, "automatic reload failed");
            record.phase = SessionPhase::Failed;
        } else {
            info!(platform, "session reloaded automatically");
        }
    }

    fn handle_load_failure(&mut self, platform: &str, code: i32, description: &str, now: Instant) {
        let details = json!({ "code": code, "description": description });
        if BENIGN_LOAD_ERRORS.contains(&code) {
            debug!(platform, code, description, "ignoring benign load failure");
            self.telemetry.track_error(platform, "load_aborted", details);
            return;
        }

        let Some(record) = self.records.get_mut(platform) else {
            return;
        };
        let elapsed = record.elapsed_load_ms(now);
        if code == NET_ERR_CONNECTION_REFUSED && !record.refused_retry_used {
            record.refused_retry_used = true;
            record.reload_due_at = Some(now + Duration::from_secs(CONNECTION_REFUSED_RETRY_SECS));
            warn!(platform, "connection refused, retrying once");
        } else {
            record.phase = SessionPhase::Failed;
            warn!(platform, code, description, "session failed to load");
        }
        self.telemetry.track_session_load(platform, elapsed, false);
        self.telemetry.track_error(platform, "load_failed", details);
        self.publish_state(platform);
    }

    /// Reloads after a crash with exponential backoff. Crashes closer together
    /// than the stable window share one retry budget; once it is spent the
    /// session stays failed until refreshed.
    fn handle_crash(&mut self, platform: &str, reason: &str, now: Instant) {
        let Some(record) = self.records.get_mut(platform) else {
            return;
        };
        let stable_window = Duration::from_secs(CRASH_STABLE_WINDOW_SECS);
        let recent = record
            .last_crash_at
            .is_some_and(|at| now.saturating_duration_since(at) < stable_window);
        record.crash_count = if recent { record.crash_count + 1 } else { 1 };
        record.last_crash_at = Some(now);
        record.phase = SessionPhase::Failed;
        record.poll_due_at = None;
        let attempt = record.crash_count;

        error!(platform, reason, attempt, "session crashed");
        self.telemetry.track_error(
            platform,
            "crash",
            json!({ "reason": reason, "attempt": attempt }),
        );

        if attempt > CRASH_RETRY_LIMIT {
            record.reload_due_at = None;
            error!(platform, "session keeps crashing, giving up on automatic reload");
            self.telemetry
                .track_error(platform, "crash_loop", json!({ "crashes": attempt }));
        } else {
            let delay = Duration::from_secs(CRASH_RELOAD_DELAY_SECS) * 2u32.pow(attempt - 1);
            record.reload_due_at = Some(now + delay);
        }
        self.publish_state(platform);
    }

    fn step_history(&mut self, platform: Option<&str>, back: bool) -> bool {
        let Ok(platform) = self.target(platform) else {
            return false;
        };
        let Some(record) = self.records.get(&platform).filter(|record| record.is_loaded) else {
            return false;
        };
        let label = record.label.clone();
        let possible = if back {
            self.host.can_go_back(&label)
        } else {
            self.host.can_go_forward(&label)
        };
        if !possible {
            return false;
        }
        let result = if back {
            self.host.go_back(&label)
        } else {
            self.host.go_forward(&label)
        };
        result
            .map_err(|err| warn!(platform = %platform, error = %err, "history navigation failed"))
            .is_ok()
    }

    fn request_probe(&mut self, platform: &str) {
        let Some(record) = self.records.get(platform) else {
            return;
        };
        if record.phase != SessionPhase::Ready {
            return;
        }
        let script = probe_script(&record.config);
        if let Err(err) = self.host.request_snapshot(&record.label, &script) {
            debug!(platform, error = %err, "probe injection failed");
        }
    }

    fn open_external(&self, platform: &str, url: &str) {
        debug!(platform, url, "opening externally");
        self.events.publish(AppEvent::OpenExternal {
            platform: platform.to_string(),
            url: url.to_string(),
        });
    }

    fn publish_state(&self, platform: &str) {
        let record = self.records.get(platform);
        self.events
            .publish(AppEvent::SessionState(SessionStateChange {
                platform: platform.to_string(),
                live: record.is_some(),
                focused: self.focused.as_deref() == Some(platform),
                phase: record.map(|record| record.phase),
            }));
    }
}
