//! Static table of supported messaging platforms.

use serde::Serialize;

use crate::error::{Error, Result};

/// CSS selectors the page probe queries for a platform.
///
/// These are scraping heuristics for third-party markup and change whenever the
/// sites do; an empty list just skips that detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSelectors {
    pub badge: &'static [&'static str],
    pub indicators: &'static [&'static str],
    pub rows: &'static [&'static str],
    pub dots: &'static [&'static str],
    pub nav_badge: &'static [&'static str],
}

impl ProbeSelectors {
    pub const TITLE_ONLY: ProbeSelectors = ProbeSelectors {
        badge: &[],
        indicators: &[],
        rows: &[],
        dots: &[],
        nav_badge: &[],
    };

    pub fn is_title_only(&self) -> bool {
        self.badge.is_empty()
            && self.indicators.is_empty()
            && self.rows.is_empty()
            && self.dots.is_empty()
            && self.nav_badge.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    pub id: &'static str,
    pub display_name: &'static str,
    pub origin_url: &'static str,
    pub icon: &'static str,
    pub requires_custom_user_agent: bool,
    /// Hosts outside the origin that may stay in-session (federated login).
    pub auth_hosts: &'static [&'static str],
    pub probe: ProbeSelectors,
}

const MESSENGER_PROBE: ProbeSelectors = ProbeSelectors {
    badge: &[
        "[data-testid=\"mwthreadlist_unread_badge_count\"]",
        "[data-testid=\"unread_indicator_badge\"]",
    ],
    indicators: &[
        "[data-testid=\"mwthreadlist_row_unread_indicator\"]",
        "[aria-label*=\"unread\" i]:not([role=\"row\"])",
    ],
    rows: &["[role=\"row\"]", "[data-testid=\"mwthreadlist-row\"]"],
    dots: &[
        "[aria-label=\"Unread\"]",
        "[aria-label=\"Unread dot\"]",
        "[aria-label=\"Mark as read\"]",
    ],
    nav_badge: &["[data-testid=\"navigation_badge\"]"],
};

const WHATSAPP_PROBE: ProbeSelectors = ProbeSelectors {
    badge: &[],
    indicators: &["span[aria-label*=\"unread message\" i]"],
    rows: &["[role=\"listitem\"]"],
    dots: &[],
    nav_badge: &[],
};

const SLACK_PROBE: ProbeSelectors = ProbeSelectors {
    badge: &[".p-channel_sidebar__badge"],
    indicators: &[".p-channel_sidebar__channel--unread"],
    rows: &[],
    dots: &[],
    nav_badge: &[],
};

const DISCORD_PROBE: ProbeSelectors = ProbeSelectors {
    badge: &["[class*=\"numberBadge\"]"],
    indicators: &[],
    rows: &[],
    dots: &[],
    nav_badge: &[],
};

pub const BUILTIN_PLATFORMS: &[PlatformConfig] = &[
    PlatformConfig {
        id: "messenger",
        display_name: "Messenger",
        origin_url: "https://www.messenger.com/",
        icon: "messenger.png",
        requires_custom_user_agent: false,
        auth_hosts: &["facebook.com"],
        probe: MESSENGER_PROBE,
    },
    PlatformConfig {
        id: "whatsapp",
        display_name: "WhatsApp",
        origin_url: "https://web.whatsapp.com/",
        icon: "whatsapp.png",
        requires_custom_user_agent: true,
        auth_hosts: &[],
        probe: WHATSAPP_PROBE,
    },
    PlatformConfig {
        id: "instagram",
        display_name: "Instagram",
        origin_url: "https://www.instagram.com/direct/inbox/",
        icon: "instagram.png",
        requires_custom_user_agent: false,
        auth_hosts: &["facebook.com"],
        probe: ProbeSelectors::TITLE_ONLY,
    },
    PlatformConfig {
        id: "linkedin",
        display_name: "LinkedIn",
        origin_url: "https://www.linkedin.com/messaging/",
        icon: "linkedin.png",
        requires_custom_user_agent: false,
        auth_hosts: &[],
        probe: ProbeSelectors::TITLE_ONLY,
    },
    PlatformConfig {
        id: "x",
        display_name: "X (Twitter)",
        origin_url: "https://x.com/messages",
        icon: "x.png",
        requires_custom_user_agent: false,
        auth_hosts: &["twitter.com"],
        probe: ProbeSelectors::TITLE_ONLY,
    },
    PlatformConfig {
        id: "slack",
        display_name: "Slack",
        origin_url: "https://app.slack.com/client",
        icon: "slack.png",
        requires_custom_user_agent: true,
        auth_hosts: &["slack.com"],
        probe: SLACK_PROBE,
    },
    PlatformConfig {
        id: "telegram",
        display_name: "Telegram",
        origin_url: "https://web.telegram.org",
        icon: "telegram.png",
        requires_custom_user_agent: false,
        auth_hosts: &[],
        probe: ProbeSelectors::TITLE_ONLY,
    },
    PlatformConfig {
        id: "discord",
        display_name: "Discord",
        origin_url: "https://discord.com/app",
        icon: "discord.png",
        requires_custom_user_agent: false,
        auth_hosts: &["hcaptcha.com"],
        probe: DISCORD_PROBE,
    },
    PlatformConfig {
        id: "teams",
        display_name: "Microsoft Teams",
        origin_url: "https://teams.microsoft.com/",
        icon: "teams.png",
        requires_custom_user_agent: true,
        auth_hosts: &["login.microsoftonline.com", "login.live.com"],
        probe: ProbeSelectors::TITLE_ONLY,
    },
];

#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    platforms: Vec<PlatformConfig>,
}

impl PlatformRegistry {
    pub fn new(platforms: Vec<PlatformConfig>) -> Self {
        Self { platforms }
    }

    pub fn builtin() -> Self {
        Self::new(BUILTIN_PLATFORMS.to_vec())
    }

    pub fn get(&self, id: &str) -> Option<&PlatformConfig> {
        self.platforms.iter().find(|platform| platform.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&PlatformConfig> {
        self.get(id)
            .ok_or_else(|| Error::UnknownPlatform(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.platforms.iter().map(|platform| platform.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformConfig> {
        self.platforms.iter()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Display name for an id, falling back to the id itself.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map_or(id, |platform| platform.display_name)
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_ids_are_unique_and_origins_parse() {
        let registry = PlatformRegistry::builtin();
        let ids: HashSet<_> = registry.ids().collect();
        assert_eq!(ids.len(), registry.len());

        for platform in registry.iter() {
            let url = url::Url::parse(platform.origin_url).expect("origin must parse");
            assert_eq!(url.scheme(), "https", "{} must use https", platform.id);
        }
    }

    #[test]
    fn require_rejects_unknown_platform() {
        let registry = PlatformRegistry::builtin();
        assert!(registry.require("slack").is_ok());
        assert!(matches!(
            registry.require("myspace"),
            Err(Error::UnknownPlatform(id)) if id == "myspace"
        ));
        assert_eq!(registry.display_name("teams"), "Microsoft Teams");
        assert_eq!(registry.display_name("myspace"), "myspace");
    }
}
