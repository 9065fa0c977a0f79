//! Unread-count detection over page snapshots.
//!
//! The hosted page is never inspected directly: a probe script collects a
//! [`PageSnapshot`] with the platform's selectors and reports it back as JSON.
//! Detection is then a pure function of that snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::PlatformConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    BadgeElement,
    UnreadBadges,
    UnreadRows,
    UnreadDots,
    NavBadge,
    Title,
    None,
    Error,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::BadgeElement => "badge_element",
            DetectionMethod::UnreadBadges => "unread_badges",
            DetectionMethod::UnreadRows => "unread_rows",
            DetectionMethod::UnreadDots => "unread_dots",
            DetectionMethod::NavBadge => "nav_badge",
            DetectionMethod::Title => "title",
            DetectionMethod::None => "none",
            DetectionMethod::Error => "error",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable result of one probe run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageSnapshot {
    pub title: String,
    /// Text of explicit numeric badge elements, in selector order.
    pub badge_texts: Vec<String>,
    /// Number of discrete unread-indicator markers.
    pub indicator_count: usize,
    /// Accessible labels of thread-list rows.
    pub row_labels: Vec<String>,
    pub dot_count: usize,
    pub nav_badge_texts: Vec<String>,
    /// Set when the probe caught an exception.
    pub error: Option<String>,
}

impl PageSnapshot {
    pub fn from_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub count: u32,
    pub method: DetectionMethod,
}

impl Detection {
    pub const NONE: Detection = Detection {
        count: 0,
        method: DetectionMethod::None,
    };

    pub const ERROR: Detection = Detection {
        count: 0,
        method: DetectionMethod::Error,
    };
}

type Strategy = fn(&PageSnapshot) -> Option<u32>;

/// Tried in order; the first strategy with a definitive positive count wins.
const STRATEGIES: &[(DetectionMethod, Strategy)] = &[
    (DetectionMethod::BadgeElement, badge_element),
    (DetectionMethod::UnreadBadges, unread_badges),
    (DetectionMethod::UnreadRows, unread_rows),
    (DetectionMethod::UnreadDots, unread_dots),
    (DetectionMethod::NavBadge, nav_badge),
    (DetectionMethod::Title, title_prefix),
];

pub fn detect(snapshot: &PageSnapshot) -> Detection {
    if let Some(error) = snapshot.error.as_deref() {
        debug!(%error, "probe reported an error");
        return Detection::ERROR;
    }

    STRATEGIES
        .iter()
        .find_map(|(method, strategy)| {
            strategy(snapshot).map(|count| Detection {
                count,
                method: *method,
            })
        })
        .unwrap_or(Detection::NONE)
}

/// Detects from the raw JSON a probe posted back. Unparseable reports count as
/// a detection error, never as a failure of the caller.
pub fn detect_report(raw: &str) -> Detection {
    match serde_json::from_str::<PageSnapshot>(raw) {
        Ok(snapshot) => detect(&snapshot),
        Err(error) => {
            debug!(%error, "malformed page snapshot");
            Detection::ERROR
        }
    }
}

/// Parses badge text such as `"5"` or `"99+"`. Zero, empty and non-numeric
/// text are treated as no badge.
pub fn parse_badge_text(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    let digits = trimmed.strip_suffix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|count| *count > 0)
}

/// Count from a `"(N) …"` or `"[N] …"` title prefix.
pub fn title_count(title: &str) -> Option<u32> {
    let trimmed = title.trim_start();
    let close = match trimmed.chars().next()? {
        '(' => ')',
        '[' => ']',
        _ => return None,
    };
    let inner = &trimmed[1..];
    let end = inner.find(close)?;
    parse_badge_text(&inner[..end])
}

fn badge_element(snapshot: &PageSnapshot) -> Option<u32> {
    snapshot
        .badge_texts
        .iter()
        .find_map(|text| parse_badge_text(text))
}

fn unread_badges(snapshot: &PageSnapshot) -> Option<u32> {
    positive(snapshot.indicator_count)
}

fn unread_rows(snapshot: &PageSnapshot) -> Option<u32> {
    let rows = snapshot
        .row_labels
        .iter()
        .map(|label| label.to_lowercase())
        .filter(|label| label.contains("unread") || label.contains("new message"))
        .count();
    positive(rows)
}

fn unread_dots(snapshot: &PageSnapshot) -> Option<u32> {
    positive(snapshot.dot_count)
}

fn nav_badge(snapshot: &PageSnapshot) -> Option<u32> {
    snapshot
        .nav_badge_texts
        .iter()
        .find_map(|text| parse_badge_text(text))
}

fn title_prefix(snapshot: &PageSnapshot) -> Option<u32> {
    title_count(&snapshot.title)
}

fn positive(count: usize) -> Option<u32> {
    (count > 0).then(|| u32::try_from(count).unwrap_or(u32::MAX))
}

const PROBE_TEMPLATE: &str = r#"(function () {
  var selectors = __SELECTORS__;
  var all = function (list) {
    return list.reduce(function (acc, sel) {
      return acc.concat(Array.prototype.slice.call(document.querySelectorAll(sel)));
    }, []);
  };
  var texts = function (list) {
    return all(list)
      .map(function (el) { return (el.textContent || '').trim(); })
      .filter(function (text) { return text.length > 0; });
  };
  var collect = function () {
    try {
      return {
        title: document.title || '',
        badgeTexts: texts(selectors.badge),
        indicatorCount: all(selectors.indicators).length,
        rowLabels: all(selectors.rows).map(function (el) { return el.getAttribute('aria-label') || ''; }),
        dotCount: all(selectors.dots).length,
        navBadgeTexts: texts(selectors.navBadge)
      };
    } catch (err) {
      return { title: document.title || '', error: String((err && err.message) || err) };
    }
  };
  var report = function () {
    try {
      window.__TAURI_INTERNALS__.invoke('report_page_snapshot', { snapshot: JSON.stringify(collect()) });
    } catch (_) {}
  };
  report();
  if (!window.__chattioTitleObserver) {
    var title = document.querySelector('title');
    if (title) {
      window.__chattioTitleObserver = new MutationObserver(report);
      window.__chattioTitleObserver.observe(title, { childList: true, characterData: true, subtree: true });
    }
  }
})();"#;

/// Script injected into a session to collect and report a [`PageSnapshot`].
pub fn probe_script(platform: &PlatformConfig) -> String {
    let selectors = serde_json::to_string(&platform.probe).unwrap_or_else(|_| {
        r#"{"badge":[],"indicators":[],"rows":[],"dots":[],"navBadge":[]}"#.to_string()
    });
    PROBE_TEMPLATE.replace("__SELECTORS__", &selectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlatformRegistry;

    #[test]
    fn badge_element_wins_over_lower_priority_markers() {
        let snapshot = PageSnapshot {
            badge_texts: vec!["5".into()],
            row_labels: vec![
                "Unread message from Alice".into(),
                "Unread message from Bob".into(),
                "Unread message from Carol".into(),
            ],
            ..PageSnapshot::default()
        };

        assert_eq!(
            detect(&snapshot),
            Detection {
                count: 5,
                method: DetectionMethod::BadgeElement
            }
        );
    }

    #[test]
    fn malformed_badge_text_falls_through() {
        let snapshot = PageSnapshot {
            badge_texts: vec!["new".into(), "0".into(), "".into()],
            row_labels: vec!["Unread message from Alice".into(), "Read message".into()],
            ..PageSnapshot::default()
        };

        let detection = detect(&snapshot);
        assert_eq!(detection.method, DetectionMethod::UnreadRows);
        assert_eq!(detection.count, 1);
    }

    #[test]
    fn rows_match_case_insensitively() {
        let snapshot = PageSnapshot {
            row_labels: vec!["UNREAD Message".into(), "New MESSAGE".into(), "Alice".into()],
            ..PageSnapshot::default()
        };
        assert_eq!(detect(&snapshot).count, 2);
    }

    #[test]
    fn markers_take_priority_over_rows_and_title() {
        let snapshot = PageSnapshot {
            title: "(9) Messenger".into(),
            indicator_count: 3,
            row_labels: vec!["Unread".into()],
            ..PageSnapshot::default()
        };
        assert_eq!(
            detect(&snapshot),
            Detection {
                count: 3,
                method: DetectionMethod::UnreadBadges
            }
        );
    }

    #[test]
    fn title_prefix_is_last_resort() {
        assert_eq!(
            detect(&PageSnapshot::from_title("(12) Slack | general")),
            Detection {
                count: 12,
                method: DetectionMethod::Title
            }
        );
        assert_eq!(detect(&PageSnapshot::from_title("Slack")), Detection::NONE);
        assert_eq!(detect(&PageSnapshot::from_title("(0) Slack")), Detection::NONE);
    }

    #[test]
    fn parses_capped_and_bracketed_counts() {
        assert_eq!(parse_badge_text(" 99+ "), Some(99));
        assert_eq!(parse_badge_text("12a"), None);
        assert_eq!(parse_badge_text("+"), None);
        assert_eq!(title_count("[4] Discord"), Some(4));
        assert_eq!(title_count("(3 Discord"), None);
    }

    #[test]
    fn probe_errors_and_garbage_reports_become_error_method() {
        let snapshot = PageSnapshot {
            badge_texts: vec!["7".into()],
            error: Some("SyntaxError: bad selector".into()),
            ..PageSnapshot::default()
        };
        assert_eq!(detect(&snapshot), Detection::ERROR);
        assert_eq!(detect_report("{not json"), Detection::ERROR);
    }

    #[test]
    fn report_json_uses_camel_case_fields() {
        let detection = detect_report(r#"{"title":"WhatsApp","navBadgeTexts":["2"]}"#);
        assert_eq!(
            detection,
            Detection {
                count: 2,
                method: DetectionMethod::NavBadge
            }
        );
    }

    #[test]
    fn probe_script_embeds_platform_selectors() {
        let registry = PlatformRegistry::builtin();
        let script = probe_script(registry.require("messenger").unwrap());
        assert!(script.contains("mwthreadlist_unread_badge_count"));
        assert!(script.contains("report_page_snapshot"));
        assert!(!script.contains("__SELECTORS__"));
    }
}
