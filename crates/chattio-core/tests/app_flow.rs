use std::{path::Path, sync::Arc};

use chattio_core::{
    consts::UNREAD_STATE_FILE,
    events::{drain, EventReceiver},
    host::{HostEvent, SessionLabel},
    registry::PlatformRegistry,
    settings::SettingsStore,
    storage::{JsonUnreadStore, UnreadCounts},
    telemetry::TelemetryKind,
    test_utils::{HostCall, ManualClock, RecordingHost},
    AppCore, AppEvent, EventBus,
};

struct Harness {
    clock: Arc<ManualClock>,
    host: RecordingHost,
    core: AppCore,
    rx: EventReceiver,
}

fn harness(dir: &Path) -> Harness {
    let registry = PlatformRegistry::builtin();
    let clock = Arc::new(ManualClock::new());
    let host = RecordingHost::new();
    let settings = Arc::new(SettingsStore::load(dir, &registry).unwrap());
    let (events, rx) = EventBus::channel();
    let mut core = AppCore::new(
        registry,
        settings,
        Box::new(JsonUnreadStore::new(dir.join(UNREAD_STATE_FILE))),
        Box::new(host.clone()),
        clock.clone(),
        events,
    );
    core.restore_unread();
    Harness {
        clock,
        host,
        core,
        rx,
    }
}

fn label(h: &Harness, platform: &str) -> SessionLabel {
    h.core.sessions().record(platform).unwrap().label.clone()
}

fn load(h: &mut Harness, platform: &str) -> SessionLabel {
    h.core.activate(platform).unwrap();
    let label = label(h, platform);
    h.core.handle_host_event(&label, HostEvent::LoadStarted);
    h.core.handle_host_event(&label, HostEvent::LoadFinished);
    label
}

fn report(h: &mut Harness, label: &SessionLabel, json: &str) {
    h.core.handle_host_event(
        label,
        HostEvent::SnapshotReported {
            raw: json.to_string(),
        },
    );
}

fn notifications(rx: &mut EventReceiver) -> usize {
    drain(rx)
        .into_iter()
        .filter(|event| matches!(event, AppEvent::Notification(_)))
        .count()
}

#[test]
fn probe_report_updates_counts_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    let slack = load(&mut h, "slack");
    assert!(h.host.calls().contains(&HostCall::Snapshot(slack.clone())));

    report(
        &mut h,
        &slack,
        r#"{"title":"Slack","badgeTexts":["4"],"rowLabels":["unread","unread"]}"#,
    );

    assert_eq!(h.core.unread().count("slack"), 4);
    assert_eq!(h.core.summary().total_messages, 4);
    assert_eq!(notifications(&mut h.rx), 1);

    let raw = std::fs::read_to_string(dir.path().join(UNREAD_STATE_FILE)).unwrap();
    let saved: UnreadCounts = serde_json::from_str(&raw).unwrap();
    assert_eq!(saved.get("slack"), Some(&4));

    let detections = h.core.telemetry().events(Some("badge_detection"));
    assert!(matches!(
        &detections[0].kind,
        TelemetryKind::BadgeDetection { method, count: 4 } if method == "badge_element"
    ));
}

#[test]
fn restored_counts_drop_unknown_platforms() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(UNREAD_STATE_FILE),
        r#"{"slack": 2, "whatsapp": 5, "icq": 7}"#,
    )
    .unwrap();

    let mut h = harness(dir.path());
    assert_eq!(h.core.unread().count("slack"), 2);
    assert_eq!(h.core.unread().count("whatsapp"), 5);
    assert!(!h.core.unread().counts().contains_key("icq"));
    assert_eq!(notifications(&mut h.rx), 0);
}

#[test]
fn title_only_platform_counts_from_title() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    let telegram = load(&mut h, "telegram");
    h.core.handle_host_event(
        &telegram,
        HostEvent::TitleChanged {
            title: "(3) Telegram Web".to_string(),
        },
    );
    assert_eq!(h.core.unread().count("telegram"), 3);
}

#[test]
fn failed_detection_keeps_previous_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    let slack = load(&mut h, "slack");
    report(&mut h, &slack, r#"{"badgeTexts":["6"]}"#);
    report(&mut h, &slack, "{not json");
    report(&mut h, &slack, r#"{"error":"TypeError: x is null"}"#);

    assert_eq!(h.core.unread().count("slack"), 6);
    let methods: Vec<String> = h
        .core
        .telemetry()
        .events(Some("badge_detection"))
        .into_iter()
        .filter_map(|event| match event.kind {
            TelemetryKind::BadgeDetection { method, .. } => Some(method),
            _ => None,
        })
        .collect();
    assert_eq!(methods, vec!["badge_element", "error", "error"]);
}

#[test]
fn disabling_a_platform_closes_its_session_and_mutes_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    let slack = load(&mut h, "slack");
    report(&mut h, &slack, r#"{"badgeTexts":["3"]}"#);
    load(&mut h, "discord");

    h.core.set_platform_enabled("slack", false).unwrap();
    assert!(!h.core.sessions().is_live("slack"));
    assert!(!h.host.is_live("slack"));
    assert_eq!(h.core.summary().total_messages, 0);
    assert_eq!(h.core.unread().count("slack"), 3);

    // Late events from the closed webview are ignored.
    report(&mut h, &slack, r#"{"badgeTexts":["9"]}"#);
    assert_eq!(h.core.unread().count("slack"), 3);
}

#[test]
fn focused_session_survives_while_others_are_recycled() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    load(&mut h, "slack");
    load(&mut h, "discord");

    for _ in 0..(10 * 60) {
        h.clock.advance_secs(1);
        h.core.tick();
    }

    assert!(h.core.sessions().is_live("discord"));
    assert!(!h.core.sessions().is_live("slack"));

    h.core.activate("slack").unwrap();
    let recreated = label(&h, "slack");
    assert_eq!(h.core.sessions().len(), 2);
    assert!(recreated.generation > 1);
}

#[test]
fn cooldown_applies_across_platforms() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path());
    let slack = load(&mut h, "slack");
    let discord = load(&mut h, "discord");
    drain(&mut h.rx);

    report(&mut h, &slack, r#"{"badgeTexts":["1"]}"#);
    h.clock.advance_secs(1);
    report(&mut h, &discord, r#"{"badgeTexts":["1"]}"#);
    assert_eq!(notifications(&mut h.rx), 1);

    h.clock.advance_secs(6);
    report(&mut h, &discord, r#"{"badgeTexts":["2"]}"#);
    assert_eq!(notifications(&mut h.rx), 1);
}

#[test]
fn start_prefers_the_last_active_platform() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut h = harness(dir.path());
        assert_eq!(h.core.start().unwrap().as_deref(), Some("messenger"));
        h.core.activate("teams").unwrap();
        h.core.shutdown();
        assert!(h.host.live_labels().is_empty());
    }

    let mut h = harness(dir.path());
    assert_eq!(h.core.start().unwrap().as_deref(), Some("teams"));
}

#[test]
fn open_wires_production_services() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("config");
    let host = RecordingHost::new();
    let mut core = AppCore::open(&nested, Box::new(host.clone()), EventBus::detached()).unwrap();
    core.set_unread_count("x", 2).unwrap();
    assert!(nested.join(UNREAD_STATE_FILE).exists());
    assert_eq!(core.start().unwrap().as_deref(), Some("messenger"));
    assert!(host.is_live("messenger"));
}
