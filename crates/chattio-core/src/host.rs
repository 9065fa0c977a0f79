//! Seam between the session manager and whatever actually renders pages.

use std::fmt;

use serde::Serialize;

use crate::{
    error::Result,
    registry::PlatformConfig,
};

/// Identity of one materialised session. The generation changes every time a
/// platform's session is recreated, so events from a destroyed webview can be
/// told apart from its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionLabel {
    pub platform: String,
    pub generation: u64,
}

const LABEL_PREFIX: &str = "session-";

impl SessionLabel {
    pub fn new(platform: impl Into<String>, generation: u64) -> Self {
        Self {
            platform: platform.into(),
            generation,
        }
    }

    /// Parses `session-<platform>-<generation>`.
    pub fn parse(label: &str) -> Option<Self> {
        let rest = label.strip_prefix(LABEL_PREFIX)?;
        let (platform, generation) = rest.rsplit_once('-')?;
        if platform.is_empty() {
            return None;
        }
        Some(Self::new(platform, generation.parse().ok()?))
    }
}

impl fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LABEL_PREFIX}{}-{}", self.platform, self.generation)
    }
}

/// Events a hosted page reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    LoadStarted,
    LoadFinished,
    LoadFailed { code: i32, description: String },
    TitleChanged { title: String },
    SnapshotReported { raw: String },
    NavigationRequested { url: String },
    NewWindowRequested { url: String },
    Crashed { reason: String },
    Unresponsive,
    Responsive,
    ConsoleMessage { level: i32, message: String },
}

/// Embedded browser backend.
pub trait SessionHost: Send {
    fn create(&mut self, label: &SessionLabel, config: &PlatformConfig, user_agent: Option<&str>)
        -> Result<()>;
    fn load(&mut self, label: &SessionLabel, url: &str) -> Result<()>;
    fn reload(&mut self, label: &SessionLabel) -> Result<()>;
    fn can_go_back(&self, label: &SessionLabel) -> bool;
    fn can_go_forward(&self, label: &SessionLabel) -> bool;
    fn go_back(&mut self, label: &SessionLabel) -> Result<()>;
    fn go_forward(&mut self, label: &SessionLabel) -> Result<()>;
    fn show(&mut self, label: &SessionLabel) -> Result<()>;
    fn hide(&mut self, label: &SessionLabel) -> Result<()>;
    fn destroy(&mut self, label: &SessionLabel) -> Result<()>;
    /// Injects the detection probe; the result arrives later as
    /// [`HostEvent::SnapshotReported`].
    fn request_snapshot(&mut self, label: &SessionLabel, script: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_its_string_form() {
        let label = SessionLabel::new("whatsapp", 12);
        assert_eq!(label.to_string(), "session-whatsapp-12");
        assert_eq!(SessionLabel::parse("session-whatsapp-12"), Some(label));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert_eq!(SessionLabel::parse("main"), None);
        assert_eq!(SessionLabel::parse("session--3"), None);
        assert_eq!(SessionLabel::parse("session-slack-x"), None);
        assert_eq!(SessionLabel::parse("session-slack"), None);
    }
}
