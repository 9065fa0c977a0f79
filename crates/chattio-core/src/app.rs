//! Application root: constructs every service and routes events between them.

use std::{path::Path, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    clock::{Clock, SystemClock},
    consts::UNREAD_STATE_FILE,
    detector::{detect, detect_report, Detection, DetectionMethod, PageSnapshot},
    error::Result,
    events::EventBus,
    host::{HostEvent, SessionHost, SessionLabel},
    navigation::NavigationDecision,
    registry::PlatformRegistry,
    session::{PageSignal, SessionManager},
    settings::{AppStateDoc, GeneralSettings, PerformancePatch, PerformanceSettings, SettingsStore},
    storage::{JsonUnreadStore, UnreadStore},
    telemetry::Telemetry,
    unread::{UnreadAggregator, UnreadSummary},
};

pub struct AppCore {
    registry: PlatformRegistry,
    settings: Arc<SettingsStore>,
    telemetry: Arc<Telemetry>,
    sessions: SessionManager,
    unread: UnreadAggregator,
}

impl AppCore {
    pub fn new(
        registry: PlatformRegistry,
        settings: Arc<SettingsStore>,
        store: Box<dyn UnreadStore>,
        host: Box<dyn SessionHost>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let telemetry = Arc::new(Telemetry::new(clock.clone(), events.clone()));
        let sessions = SessionManager::new(
            &registry,
            host,
            clock.clone(),
            settings.clone(),
            telemetry.clone(),
            events.clone(),
        );
        let unread = UnreadAggregator::new(&registry, settings.clone(), store, clock, events);
        Self {
            registry,
            settings,
            telemetry,
            sessions,
            unread,
        }
    }

    /// Production wiring: built-in platforms, system clock and JSON documents
    /// under `dir`. Persisted unread counts are restored.
    pub fn open(dir: &Path, host: Box<dyn SessionHost>, events: EventBus) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let registry = PlatformRegistry::builtin();
        let settings = Arc::new(SettingsStore::load(dir, &registry)?);
        let store = Box::new(JsonUnreadStore::new(dir.join(UNREAD_STATE_FILE)));
        let mut core = Self::new(
            registry,
            settings,
            store,
            host,
            Arc::new(SystemClock),
            events,
        );
        core.restore_unread();
        info!(dir = %dir.display(), "core opened");
        Ok(core)
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn unread(&self) -> &UnreadAggregator {
        &self.unread
    }

    pub fn summary(&self) -> UnreadSummary {
        self.unread.compute_summary()
    }

    /// Focuses the last active platform, or the first enabled one in sidebar
    /// order. Returns the platform that was focused.
    pub fn start(&mut self) -> Result<Option<String>> {
        let app_state = self.settings.app_state();
        let candidate = app_state
            .settings
            .last_active_tab
            .clone()
            .filter(|id| app_state.is_platform_enabled(id))
            .or_else(|| {
                app_state
                    .order
                    .iter()
                    .find(|id| app_state.is_platform_enabled(id))
                    .cloned()
            });
        let Some(platform) = candidate else {
            info!("no enabled platforms to focus");
            return Ok(None);
        };
        self.activate(&platform)?;
        Ok(Some(platform))
    }

    pub fn activate(&mut self, platform: &str) -> Result<()> {
        self.sessions.activate(platform)?;
        if self.settings.general().last_active_tab.as_deref() != Some(platform) {
            let remembered = self
                .settings
                .update_general(|general| general.last_active_tab = Some(platform.to_string()));
            if let Err(err) = remembered {
                warn!(platform, error = %err, "failed to remember last active platform");
            }
        }
        Ok(())
    }

    pub fn prewarm(&mut self, platform: &str) -> Result<()> {
        self.sessions.prewarm(platform)
    }

    pub fn unload(&mut self, platform: &str) -> bool {
        self.sessions.unload(platform)
    }

    pub fn refresh(&mut self, platform: Option<&str>) -> Result<()> {
        self.sessions.refresh(platform)
    }

    pub fn navigate_back(&mut self, platform: Option<&str>) -> bool {
        self.sessions.navigate_back(platform)
    }

    pub fn navigate_forward(&mut self, platform: Option<&str>) -> bool {
        self.sessions.navigate_forward(platform)
    }

    pub fn navigate(&mut self, platform: &str, url: &str) -> Result<NavigationDecision> {
        self.sessions.navigate(platform, url)
    }

    /// Fires due session timers. Call about once a second.
    pub fn tick(&mut self) {
        self.sessions.tick();
    }

    pub fn handle_host_event(&mut self, label: &SessionLabel, event: HostEvent) {
        let Some(signal) = self.sessions.handle_event(label, event) else {
            return;
        };
        let detection = match signal {
            PageSignal::Title(title) => detect(&PageSnapshot::from_title(title)),
            PageSignal::Report(raw) => detect_report(&raw),
        };
        self.apply_detection(&label.platform, detection);
    }

    /// Detection errors are recorded but leave the last known count in place.
    fn apply_detection(&mut self, platform: &str, detection: Detection) {
        self.telemetry
            .track_detection(platform, detection.method.as_str(), detection.count);
        if detection.method == DetectionMethod::Error {
            debug!(platform, "detection failed, keeping previous count");
            return;
        }
        if let Err(err) = self.unread.set_count(platform, i64::from(detection.count)) {
            warn!(platform, error = %err, "failed to apply unread count");
        }
    }

    /// Loads persisted unread counts and publishes the initial summary.
    pub fn restore_unread(&mut self) {
        self.unread.restore();
    }

    pub fn set_unread_count(&mut self, platform: &str, count: i64) -> Result<bool> {
        self.unread.set_count(platform, count)
    }

    pub fn reset_unread(&mut self) {
        self.unread.reset();
    }

    /// Disabling a platform also destroys its session.
    pub fn set_platform_enabled(&mut self, platform: &str, enabled: bool) -> Result<AppStateDoc> {
        let doc = self.settings.set_platform_enabled(platform, enabled)?;
        if !enabled && self.sessions.unload(platform) {
            info!(platform, "session closed for disabled platform");
        }
        self.unread.republish();
        Ok(doc)
    }

    pub fn set_platform_notifications(
        &mut self,
        platform: &str,
        enabled: bool,
    ) -> Result<AppStateDoc> {
        let doc = self.settings.set_platform_notifications(platform, enabled)?;
        self.unread.republish();
        Ok(doc)
    }

    pub fn update_general(
        &mut self,
        update: impl FnOnce(&mut GeneralSettings),
    ) -> Result<GeneralSettings> {
        let general = self.settings.update_general(update)?;
        self.unread.republish();
        Ok(general)
    }

    pub fn reorder(&mut self, order: Vec<String>) -> Result<AppStateDoc> {
        self.settings.reorder(order)
    }

    /// Restores default settings; platforms that end up disabled lose their
    /// sessions.
    pub fn reset_settings(&mut self) -> Result<AppStateDoc> {
        let doc = self.settings.reset()?;
        for platform in self.sessions.live_platforms() {
            if !doc.is_platform_enabled(&platform) {
                self.sessions.unload(&platform);
            }
        }
        self.unread.republish();
        Ok(doc)
    }

    pub fn update_performance(&mut self, patch: PerformancePatch) -> Result<PerformanceSettings> {
        self.settings.update_performance(patch)
    }

    pub fn shutdown(&mut self) {
        self.sessions.shutdown();
    }
}
