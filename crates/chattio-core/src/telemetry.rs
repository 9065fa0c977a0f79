//! Bounded, in-memory diagnostics log.
//!
//! Events are appended to a FIFO ring buffer with a capacity fixed at
//! construction. Nothing leaves the machine unless the user exports a
//! snapshot.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{clock::Clock, consts::TELEMETRY_CAPACITY, events::AppEvent, events::EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecycleReason {
    Inactivity,
    SessionLimit,
    Manual,
}

impl RecycleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecycleReason::Inactivity => "inactivity",
            RecycleReason::SessionLimit => "session_limit",
            RecycleReason::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryKind {
    SessionLoad {
        load_time_ms: u64,
        success: bool,
    },
    SessionRecycle {
        reason: RecycleReason,
    },
    SessionError {
        error_type: String,
        #[serde(default)]
        details: serde_json::Value,
    },
    BadgeDetection {
        method: String,
        count: u32,
    },
    Update {
        stage: String,
        #[serde(default)]
        details: serde_json::Value,
    },
    PerformanceMetric {
        metric_name: String,
        value: f64,
        #[serde(default)]
        metadata: serde_json::Value,
    },
}

impl TelemetryKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            TelemetryKind::SessionLoad { .. } => "session_load",
            TelemetryKind::SessionRecycle { .. } => "session_recycle",
            TelemetryKind::SessionError { .. } => "session_error",
            TelemetryKind::BadgeDetection { .. } => "badge_detection",
            TelemetryKind::Update { .. } => "update",
            TelemetryKind::PerformanceMetric { .. } => "performance_metric",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    #[serde(flatten)]
    pub kind: TelemetryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Unix milliseconds.
    pub timestamp: u64,
}

/// An event reported by a collaborator outside the core, such as the
/// frontend or an updater. The timestamp is assigned on arrival.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryReport {
    #[serde(flatten)]
    pub kind: TelemetryKind,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    pub total_loads: usize,
    pub successful_loads: usize,
    pub failed_loads: usize,
    pub success_rate: f64,
    /// Mean over successful loads only.
    pub average_load_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionStats {
    pub total: usize,
    pub successful: usize,
    pub success_rate: f64,
    pub by_method: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub session_duration_ms: u64,
    pub total_events: usize,
    pub by_type: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_loads: Option<LoadStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recycles: Option<CountStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<CountStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_detection: Option<DetectionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<CountStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryExport {
    pub session_start_time: u64,
    pub session_duration_ms: u64,
    pub exported_at: u64,
    pub events: Vec<TelemetryEvent>,
    pub summary: TelemetrySummary,
}

/// Detection methods that count as a failed determination. `none` is a
/// successful determination of zero.
const FAILED_DETECTION_METHODS: &[&str] = &["error", "exception"];

pub struct Telemetry {
    clock: Arc<dyn Clock>,
    capacity: usize,
    session_start_ms: u64,
    events: Mutex<VecDeque<TelemetryEvent>>,
    bus: EventBus,
}

impl Telemetry {
    pub fn new(clock: Arc<dyn Clock>, bus: EventBus) -> Self {
        Self::with_capacity(clock, bus, TELEMETRY_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, bus: EventBus, capacity: usize) -> Self {
        let session_start_ms = clock.unix_millis();
        Self {
            clock,
            capacity: capacity.max(1),
            session_start_ms,
            events: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            bus,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, platform: Option<&str>, kind: TelemetryKind) {
        let event = TelemetryEvent {
            kind,
            platform: platform.map(str::to_string),
            timestamp: self.clock.unix_millis(),
        };
        {
            let mut events = self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            while events.len() >= self.capacity {
                events.pop_front();
            }
            events.push_back(event.clone());
        }
        self.bus.publish(AppEvent::Telemetry(event));
    }

    pub fn record_report(&self, report: TelemetryReport) {
        self.record(report.platform.as_deref(), report.kind);
    }

    pub fn track_session_load(&self, platform: &str, load_time_ms: u64, success: bool) {
        if !success {
            warn!(platform, load_time_ms, "session load failed");
        }
        self.record(
            Some(platform),
            TelemetryKind::SessionLoad {
                load_time_ms,
                success,
            },
        );
    }

    pub fn track_recycle(&self, platform: &str, reason: RecycleReason) {
        info!(platform, reason = reason.as_str(), "session recycled");
        self.record(Some(platform), TelemetryKind::SessionRecycle { reason });
    }

    pub fn track_error(&self, platform: &str, error_type: &str, details: serde_json::Value) {
        self.record(
            Some(platform),
            TelemetryKind::SessionError {
                error_type: error_type.to_string(),
                details,
            },
        );
    }

    pub fn track_detection(&self, platform: &str, method: &str, count: u32) {
        self.record(
            Some(platform),
            TelemetryKind::BadgeDetection {
                method: method.to_string(),
                count,
            },
        );
    }

    pub fn track_metric(&self, metric_name: &str, value: f64, metadata: serde_json::Value) {
        self.record(
            None,
            TelemetryKind::PerformanceMetric {
                metric_name: metric_name.to_string(),
                value,
                metadata,
            },
        );
    }

    /// All events, optionally filtered by type name (e.g. `"session_load"`).
    pub fn events(&self, type_name: Option<&str>) -> Vec<TelemetryEvent> {
        let events = self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        events
            .iter()
            .filter(|event| type_name.map_or(true, |name| event.kind.type_name() == name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .map(|events| events.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
        info!("telemetry cleared");
    }

    pub fn session_duration_ms(&self) -> u64 {
        self.clock
            .unix_millis()
            .saturating_sub(self.session_start_ms)
    }

    pub fn summarize(&self) -> TelemetrySummary {
        let events = self.events(None);
        summarize_events(&events, self.session_duration_ms())
    }

    /// Full read-only export for user-triggered diagnostics.
    pub fn export_snapshot(&self) -> TelemetryExport {
        let events = self.events(None);
        let session_duration_ms = self.session_duration_ms();
        TelemetryExport {
            session_start_time: self.session_start_ms,
            session_duration_ms,
            exported_at: self.clock.unix_millis(),
            summary: summarize_events(&events, session_duration_ms),
            events,
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn summarize_events(events: &[TelemetryEvent], session_duration_ms: u64) -> TelemetrySummary {
    let mut summary = TelemetrySummary {
        session_duration_ms,
        total_events: events.len(),
        ..TelemetrySummary::default()
    };

    let mut loads = LoadStats::default();
    let mut load_time_total: u64 = 0;
    let mut recycles = CountStats::default();
    let mut errors = CountStats::default();
    let mut detections = DetectionStats::default();
    let mut updates = CountStats::default();

    for event in events {
        *summary
            .by_type
            .entry(event.kind.type_name().to_string())
            .or_default() += 1;

        match &event.kind {
            TelemetryKind::SessionLoad {
                load_time_ms,
                success,
            } => {
                loads.total_loads += 1;
                if *success {
                    loads.successful_loads += 1;
                    load_time_total = load_time_total.saturating_add(*load_time_ms);
                }
            }
            TelemetryKind::SessionRecycle { reason } => {
                recycles.total += 1;
                *recycles
                    .by_kind
                    .entry(reason.as_str().to_string())
                    .or_default() += 1;
            }
            TelemetryKind::SessionError { error_type, .. } => {
                errors.total += 1;
                *errors.by_kind.entry(error_type.clone()).or_default() += 1;
            }
            TelemetryKind::BadgeDetection { method, .. } => {
                detections.total += 1;
                if !FAILED_DETECTION_METHODS.contains(&method.as_str()) {
                    detections.successful += 1;
                }
                *detections.by_method.entry(method.clone()).or_default() += 1;
            }
            TelemetryKind::Update { stage, .. } => {
                updates.total += 1;
                *updates.by_kind.entry(stage.clone()).or_default() += 1;
            }
            TelemetryKind::PerformanceMetric { .. } => {}
        }
    }

    if loads.total_loads > 0 {
        loads.failed_loads = loads.total_loads - loads.successful_loads;
        loads.success_rate = ratio(loads.successful_loads, loads.total_loads);
        if loads.successful_loads > 0 {
            loads.average_load_time_ms = load_time_total as f64 / loads.successful_loads as f64;
        }
        summary.session_loads = Some(loads);
    }
    if recycles.total > 0 {
        summary.recycles = Some(recycles);
    }
    if errors.total > 0 {
        summary.errors = Some(errors);
    }
    if detections.total > 0 {
        detections.success_rate = ratio(detections.successful, detections.total);
        summary.badge_detection = Some(detections);
    }
    if updates.total > 0 {
        summary.updates = Some(updates);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    fn telemetry(capacity: usize) -> (Arc<ManualClock>, Telemetry) {
        let clock = Arc::new(ManualClock::new());
        let telemetry = Telemetry::with_capacity(clock.clone(), EventBus::detached(), capacity);
        (clock, telemetry)
    }

    #[test]
    fn ring_buffer_drops_oldest_first() {
        let (_, telemetry) = telemetry(3);
        for count in 0..5 {
            telemetry.track_detection("slack", "title", count);
        }

        let counts: Vec<u32> = telemetry
            .events(None)
            .into_iter()
            .map(|event| match event.kind {
                TelemetryKind::BadgeDetection { count, .. } => count,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(counts, vec![2, 3, 4]);
    }

    #[test]
    fn summary_aggregates_loads_recycles_and_errors() {
        let (clock, telemetry) = telemetry(100);
        telemetry.track_session_load("slack", 1200, true);
        telemetry.track_session_load("teams", 800, true);
        telemetry.track_session_load("discord", 5000, false);
        telemetry.track_recycle("slack", RecycleReason::Inactivity);
        telemetry.track_recycle("teams", RecycleReason::SessionLimit);
        telemetry.track_recycle("x", RecycleReason::Inactivity);
        telemetry.track_error("discord", "crash", serde_json::Value::Null);
        clock.advance_secs(30);

        let summary = telemetry.summarize();
        assert_eq!(summary.total_events, 7);
        assert_eq!(summary.session_duration_ms, 30_000);
        assert_eq!(summary.by_type.get("session_load"), Some(&3));

        let loads = summary.session_loads.unwrap();
        assert_eq!(loads.failed_loads, 1);
        assert!((loads.average_load_time_ms - 1000.0).abs() < f64::EPSILON);
        assert!((loads.success_rate - 2.0 / 3.0).abs() < 1e-9);

        let recycles = summary.recycles.unwrap();
        assert_eq!(recycles.by_kind.get("inactivity"), Some(&2));
        assert_eq!(summary.errors.unwrap().by_kind.get("crash"), Some(&1));
        assert!(summary.badge_detection.is_none());
    }

    #[test]
    fn none_counts_as_successful_detection() {
        let (_, telemetry) = telemetry(100);
        telemetry.track_detection("slack", "none", 0);
        telemetry.track_detection("slack", "badge_element", 3);
        telemetry.track_detection("slack", "error", 0);
        telemetry.track_detection("slack", "exception", 0);

        let stats = telemetry.summarize().badge_detection.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 2);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.by_method.get("none"), Some(&1));
    }

    #[test]
    fn export_is_a_pure_read() {
        let (_, telemetry) = telemetry(100);
        telemetry.record(
            None,
            TelemetryKind::Update {
                stage: "checking".to_string(),
                details: serde_json::json!({"version": "0.3.0"}),
            },
        );
        let export = telemetry.export_snapshot();
        assert_eq!(export.events.len(), 1);
        assert_eq!(export.summary.updates.unwrap().by_kind.get("checking"), Some(&1));
        assert_eq!(telemetry.len(), 1);
    }

    #[test]
    fn reported_metrics_are_recorded_and_counted() {
        let (clock, telemetry) = telemetry(10);
        clock.advance_secs(2);
        telemetry.track_metric("startup_ms", 850.0, serde_json::Value::Null);
        let report: TelemetryReport = serde_json::from_str(
            r#"{"type":"performance_metric","metric_name":"sidebar_render_ms","value":12.5}"#,
        )
        .unwrap();
        telemetry.record_report(report);

        let metrics = telemetry.events(Some("performance_metric"));
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].timestamp, clock.unix_millis());
        match &metrics[1].kind {
            TelemetryKind::PerformanceMetric {
                metric_name, value, ..
            } => {
                assert_eq!(metric_name, "sidebar_render_ms");
                assert!((value - 12.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(telemetry.summarize().by_type.get("performance_metric"), Some(&2));
    }

    #[test]
    fn reports_can_name_a_platform() {
        let (_, telemetry) = telemetry(10);
        let report: TelemetryReport = serde_json::from_str(
            r#"{"type":"session_error","error_type":"render","platform":"teams"}"#,
        )
        .unwrap();
        telemetry.record_report(report);
        let summary = telemetry.summarize();
        assert_eq!(summary.errors.unwrap().by_kind.get("render"), Some(&1));
        assert_eq!(telemetry.events(None)[0].platform.as_deref(), Some("teams"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let (_, telemetry) = telemetry(10);
        telemetry.track_recycle("slack", RecycleReason::Manual);
        let value = serde_json::to_value(&telemetry.events(None)[0]).unwrap();
        assert_eq!(value["type"], "session_recycle");
        assert_eq!(value["reason"], "manual");
        assert_eq!(value["platform"], "slack");
    }
}
