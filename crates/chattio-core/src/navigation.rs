//! Per-session decision on which navigations stay inside the embedded page.

use tracing::debug;
use url::Url;

use crate::registry::PlatformConfig;

const EXTERNAL_SCHEMES: &[&str] = &["http", "https", "mailto"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Keep the navigation inside the session.
    Allow,
    /// Cancel in-session and hand the URL to the system browser.
    OpenExternal(Url),
    /// Cancel without opening anything.
    Deny,
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, NavigationDecision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPolicy {
    /// Registered host without a leading `www.`; `None` when the origin did not parse.
    base_host: Option<String>,
    auth_hosts: Vec<String>,
}

impl NavigationPolicy {
    pub fn for_platform(config: &PlatformConfig) -> Self {
        Self::from_origin(config.origin_url, config.auth_hosts)
    }

    pub fn from_origin(origin: &str, auth_hosts: &[&str]) -> Self {
        let base_host = Url::parse(origin)
            .ok()
            .and_then(|url| url.host_str().map(normalize_host))
            .filter(|host| !host.is_empty());
        if base_host.is_none() {
            debug!(origin, "unparseable platform origin, navigation fails closed");
        }

        Self {
            base_host,
            auth_hosts: auth_hosts
                .iter()
                .map(|host| host.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    /// Decision for a top-level navigation attempted inside the session.
    pub fn decide_navigation(&self, target: &str) -> NavigationDecision {
        let Ok(url) = Url::parse(target.trim()) else {
            return NavigationDecision::Deny;
        };

        match url.scheme() {
            "about" if url.path() == "blank" => NavigationDecision::Allow,
            "http" | "https" => {
                let Some(base) = self.base_host.as_deref() else {
                    return NavigationDecision::OpenExternal(url);
                };
                let host = url.host_str().map(normalize_host).unwrap_or_default();
                if host_within(&host, base)
                    || self.auth_hosts.iter().any(|auth| host_within(&host, auth))
                {
                    NavigationDecision::Allow
                } else {
                    NavigationDecision::OpenExternal(url)
                }
            }
            _ => external_or_deny(url),
        }
    }

    /// Pop-ups never open in-session.
    pub fn decide_new_window(&self, target: &str) -> NavigationDecision {
        match Url::parse(target.trim()) {
            Ok(url) => external_or_deny(url),
            Err(_) => NavigationDecision::Deny,
        }
    }

    pub fn allows(&self, target: &str) -> bool {
        self.decide_navigation(target).is_allowed()
    }
}

fn external_or_deny(url: Url) -> NavigationDecision {
    if EXTERNAL_SCHEMES.contains(&url.scheme()) {
        NavigationDecision::OpenExternal(url)
    } else {
        NavigationDecision::Deny
    }
}

fn normalize_host(host: &str) -> String {
    let lower = host.trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lower,
    }
}

/// `host` equals `base` or is a subdomain of it.
fn host_within(host: &str, base: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    host == base
        || host
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PlatformRegistry;

    fn external(target: &str) -> NavigationDecision {
        NavigationDecision::OpenExternal(Url::parse(target).unwrap())
    }

    #[test]
    fn same_host_and_subdomains_stay_in_session() {
        let policy = NavigationPolicy::from_origin("https://example.com/app", &[]);
        assert!(policy.allows("https://example.com/inbox"));
        assert!(policy.allows("https://accounts.example.com/login"));
        assert_eq!(
            policy.decide_navigation("https://evil.com/phish"),
            external("https://evil.com/phish")
        );
        assert_eq!(
            policy.decide_navigation("https://notexample.com/"),
            external("https://notexample.com/")
        );
    }

    #[test]
    fn www_origin_covers_sibling_subdomains() {
        let policy = NavigationPolicy::from_origin("https://www.messenger.com/", &[]);
        assert!(policy.allows("https://messenger.com/t/123"));
        assert!(policy.allows("https://static.messenger.com/x.js"));
    }

    #[test]
    fn auth_hosts_are_per_platform() {
        let registry = PlatformRegistry::builtin();
        let teams = NavigationPolicy::for_platform(registry.require("teams").unwrap());
        let slack = NavigationPolicy::for_platform(registry.require("slack").unwrap());
        let target = "https://login.microsoftonline.com/common/oauth2";

        assert!(teams.allows(target));
        assert_eq!(slack.decide_navigation(target), external(target));
    }

    #[test]
    fn new_windows_always_leave_the_session() {
        let policy = NavigationPolicy::from_origin("https://example.com/", &[]);
        assert_eq!(
            policy.decide_new_window("https://example.com/popup"),
            external("https://example.com/popup")
        );
        assert_eq!(
            policy.decide_new_window("javascript:alert(1)"),
            NavigationDecision::Deny
        );
    }

    #[test]
    fn missing_origin_fails_closed() {
        let policy = NavigationPolicy::from_origin("not a url", &["example.com"]);
        assert_eq!(
            policy.decide_navigation("https://example.com/"),
            external("https://example.com/")
        );
    }

    #[test]
    fn non_web_schemes() {
        let policy = NavigationPolicy::from_origin("https://example.com/", &[]);
        assert!(policy.allows("about:blank"));
        assert_eq!(
            policy.decide_navigation("mailto:someone@example.com"),
            external("mailto:someone@example.com")
        );
        assert_eq!(
            policy.decide_navigation("file:///etc/passwd"),
            NavigationDecision::Deny
        );
        assert_eq!(policy.decide_navigation(""), NavigationDecision::Deny);
    }
}
