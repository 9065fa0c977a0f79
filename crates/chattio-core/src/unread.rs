//! Authoritative per-platform unread counts, the cross-platform summary and
//! the decision of when to notify.

use std::{sync::Arc, time::Duration, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    consts::{NOTIFICATION_COOLDOWN_SECS, NOTIFICATION_TITLE},
    error::{Error, Result},
    events::{AppEvent, EventBus},
    registry::PlatformRegistry,
    settings::{AppStateDoc, SettingsStore},
    storage::{UnreadCounts, UnreadStore},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    /// Every known platform, including zero and muted ones; the sidebar shows
    /// these regardless of notification settings.
    pub counts: UnreadCounts,
    pub affected_platform_count: u32,
    pub total_messages: u32,
}

impl UnreadSummary {
    fn without_aggregates(mut self) -> Self {
        self.affected_platform_count = 0;
        self.total_messages = 0;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeNotification {
    pub title: String,
    pub body: String,
    pub silent: bool,
}

pub struct UnreadAggregator {
    registry: PlatformRegistry,
    settings: Arc<SettingsStore>,
    store: Box<dyn UnreadStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    counts: UnreadCounts,
    cooldown: Duration,
    notified_total: u32,
    last_notification_at: Option<Instant>,
}

impl UnreadAggregator {
    pub fn new(
        registry: &PlatformRegistry,
        settings: Arc<SettingsStore>,
        store: Box<dyn UnreadStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let counts = registry.ids().map(|id| (id.to_string(), 0)).collect();
        Self {
            registry: registry.clone(),
            settings,
            store,
            clock,
            events,
            counts,
            cooldown: Duration::from_secs(NOTIFICATION_COOLDOWN_SECS),
            notified_total: 0,
            last_notification_at: None,
        }
    }

    pub fn count(&self, platform: &str) -> u32 {
        self.counts.get(platform).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &UnreadCounts {
        &self.counts
    }

    /// Applies a detector result. Returns `Ok(false)` when the count did not
    /// change, in which case nothing is persisted or published.
    pub fn set_count(&mut self, platform: &str, count: i64) -> Result<bool> {
        if !self.registry.contains(platform) {
            return Err(Error::UnknownPlatform(platform.to_string()));
        }
        let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        let slot = self.counts.entry(platform.to_string()).or_insert(0);
        if *slot == count {
            return Ok(false);
        }

        debug!(platform, from = *slot, to = count, "unread count changed");
        *slot = count;
        self.persist();
        self.publish();
        Ok(true)
    }

    /// Filters on enabled platforms with notifications on; settings are read
    /// fresh on every call.
    pub fn compute_summary(&self) -> UnreadSummary {
        summarize(&self.counts, &self.settings.app_state())
    }

    /// Loads persisted counts for known platforms and publishes one summary
    /// without notifying about the restored backlog.
    pub fn restore(&mut self) {
        match self.store.load() {
            Ok(saved) => {
                for (id, count) in saved {
                    if let Some(slot) = self.counts.get_mut(&id) {
                        *slot = count;
                    } else {
                        debug!(platform = %id, "dropping unread count for unknown platform");
                    }
                }
            }
            Err(err) => warn!(error = %err, "failed to load unread state"),
        }

        let summary = self.compute_summary();
        self.notified_total = summary.total_messages;
        info!(total = summary.total_messages, "unread state restored");
        self.emit_badge(summary);
    }

    /// Zeroes every platform.
    pub fn reset(&mut self) {
        for count in self.counts.values_mut() {
            *count = 0;
        }
        self.persist();
        self.publish();
    }

    /// Re-evaluates after a settings change.
    pub fn republish(&mut self) {
        self.publish();
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.counts) {
            warn!(error = %err, "failed to persist unread state");
        }
    }

    fn publish(&mut self) {
        let app_state = self.settings.app_state();
        let summary = summarize(&self.counts, &app_state);
        if let Some(notification) = self.evaluate_notification(&summary, &app_state) {
            self.events.publish(AppEvent::Notification(notification));
        }
        self.emit_badge(summary);
    }

    fn emit_badge(&self, summary: UnreadSummary) {
        let summary = if self.settings.general().badge_dock_icon {
            summary
        } else {
            summary.without_aggregates()
        };
        self.events.publish(AppEvent::UnreadSummary(summary));
    }

    fn evaluate_notification(
        &mut self,
        summary: &UnreadSummary,
        app_state: &AppStateDoc,
    ) -> Option<NativeNotification> {
        let total = summary.total_messages;
        let general = &app_state.settings;

        let suppressed = !general.global_notifications
            || general.is_do_not_disturb_active(self.clock.local_time());
        if suppressed || total <= self.notified_total {
            self.notified_total = total;
            return None;
        }

        self.notified_total = total;
        let now = self.clock.now();
        if let Some(last) = self.last_notification_at {
            if now.saturating_duration_since(last) < self.cooldown {
                debug!(total, "notification suppressed by cooldown");
                return None;
            }
        }
        self.last_notification_at = Some(now);

        let body = if general.notification_preview {
            self.notification_body(summary, app_state)
        } else {
            "You have new messages".to_string()
        };
        Some(NativeNotification {
            title: NOTIFICATION_TITLE.to_string(),
            body,
            silent: !general.notification_sounds,
        })
    }

    fn notification_body(&self, summary: &UnreadSummary, app_state: &AppStateDoc) -> String {
        let total = summary.total_messages;
        if summary.affected_platform_count == 1 {
            let platform = summary
                .counts
                .iter()
                .find(|(id, count)| **count > 0 && app_state.is_notifications_enabled(id))
                .map(|(id, _)| self.registry.display_name(id))
                .unwrap_or("Chattio");
            let noun = if total == 1 { "message" } else { "messages" };
            format!("{total} new {noun} in {platform}")
        } else {
            format!(
                "{total} new messages across {} services",
                summary.affected_platform_count
            )
        }
    }
}

fn summarize(counts: &UnreadCounts, app_state: &AppStateDoc) -> UnreadSummary {
    let (affected, total) = counts
        .iter()
        .filter(|(id, count)| **count > 0 && app_state.is_notifications_enabled(id))
        .fold((0u32, 0u32), |(affected, total), (_, count)| {
            (affected + 1, total.saturating_add(*count))
        });
    UnreadSummary {
        counts: counts.clone(),
        affected_platform_count: affected,
        total_messages: total,
    }
}

/// Compact badge text: `None` for zero, `"{cap}+"` above `cap`.
pub fn badge_label(count: u32, cap: u32) -> Option<String> {
    match count {
        0 => None,
        count if count > cap => Some(format!("{cap}+")),
        count => Some(count.to_string()),
    }
}
