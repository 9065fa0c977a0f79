//! [`SessionHost`] backed by child webviews of the main window.
//!
//! Every hook hands its event to the async runtime before touching the core,
//! so a host call made while the core lock is held never waits on a hook.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chattio_core::{
    host::{HostEvent, SessionHost, SessionLabel},
    navigation::NavigationPolicy,
    registry::PlatformConfig,
    Error, Result,
};
use tauri::{
    webview::{NewWindowResponse, PageLoadEvent, WebviewBuilder},
    AppHandle, Manager, Webview, WebviewUrl,
};
use tracing::{debug, warn};
use url::Url;

use crate::{consts::MAIN_WINDOW, model::ShellState, ui_shell};

/// Back/forward stack reconstructed from finished page loads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NavHistory {
    entries: Vec<String>,
    cursor: usize,
}

impl NavHistory {
    pub(crate) fn record(&mut self, url: &str) {
        if self.entries.is_empty() {
            self.entries.push(url.to_string());
            self.cursor = 0;
            return;
        }
        if self.entries[self.cursor] == url {
            return;
        }
        if self.cursor > 0 && self.entries[self.cursor - 1] == url {
            self.cursor -= 1;
            return;
        }
        if self.entries.get(self.cursor + 1).map(String::as_str) == Some(url) {
            self.cursor += 1;
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(url.to_string());
        self.cursor = self.entries.len() - 1;
    }

    pub(crate) fn can_go_back(&self) -> bool {
        self.cursor > 0
    }

    pub(crate) fn can_go_forward(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }
}

type SharedHistory = Arc<Mutex<HashMap<String, NavHistory>>>;

pub(crate) struct TauriSessionHost {
    app: AppHandle,
    history: SharedHistory,
}

impl TauriSessionHost {
    pub(crate) fn new(app: AppHandle) -> Self {
        Self {
            app,
            history: Arc::default(),
        }
    }

    fn webview(&self, label: &SessionLabel) -> Result<Webview> {
        self.app
            .get_webview(&label.to_string())
            .ok_or_else(|| Error::host(format!("no webview for {label}")))
    }

    fn eval(&self, label: &SessionLabel, script: &str) -> Result<()> {
        self.webview(label)?
            .eval(script)
            .map_err(|error| Error::host(format!("eval failed for {label}: {error}")))
    }

    fn history_of<T>(&self, label: &SessionLabel, read: impl FnOnce(&NavHistory) -> T) -> Option<T> {
        let history = self.history.lock().ok()?;
        history.get(&label.to_string()).map(read)
    }
}

impl SessionHost for TauriSessionHost {
    fn create(
        &mut self,
        label: &SessionLabel,
        config: &PlatformConfig,
        user_agent: Option<&str>,
    ) -> Result<()> {
        let window = self
            .app
            .get_window(MAIN_WINDOW)
            .ok_or_else(|| Error::host("main window is not available"))?;
        let blank = Url::parse("about:blank").map_err(|error| Error::InvalidUrl {
            url: "about:blank".to_string(),
            reason: error.to_string(),
        })?;

        let label_text = label.to_string();
        let policy = NavigationPolicy::for_platform(config);

        let nav_app = self.app.clone();
        let nav_label = label_text.clone();
        let popup_app = self.app.clone();
        let popup_label = label_text.clone();
        let load_app = self.app.clone();
        let load_history = self.history.clone();
        let title_app = self.app.clone();

        let mut builder = WebviewBuilder::new(label_text.clone(), WebviewUrl::External(blank))
            .on_navigation(move |url| {
                let allowed = policy.allows(url.as_str());
                if !allowed {
                    dispatch_host_event(
                        &nav_app,
                        &nav_label,
                        HostEvent::NavigationRequested {
                            url: url.to_string(),
                        },
                    );
                }
                allowed
            })
            .on_new_window(move |url, _features| {
                dispatch_host_event(
                    &popup_app,
                    &popup_label,
                    HostEvent::NewWindowRequested {
                        url: url.to_string(),
                    },
                );
                NewWindowResponse::Deny
            })
            .on_page_load(move |webview, payload| {
                let url = payload.url().as_str();
                if url == "about:blank" {
                    return;
                }
                let event = match payload.event() {
                    PageLoadEvent::Started => HostEvent::LoadStarted,
                    PageLoadEvent::Finished => {
                        if let Ok(mut history) = load_history.lock() {
                            history
                                .entry(webview.label().to_string())
                                .or_default()
                                .record(url);
                        }
                        HostEvent::LoadFinished
                    }
                };
                dispatch_host_event(&load_app, webview.label(), event);
            })
            .on_document_title_changed(move |webview, title| {
                dispatch_host_event(&title_app, webview.label(), HostEvent::TitleChanged { title });
            });
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent);
        }

        let (position, size) = ui_shell::session_bounds(&window)
            .map_err(|error| Error::host(format!("failed to measure main window: {error}")))?;
        let webview = window
            .add_child(builder, position, size)
            .map_err(|error| Error::host(format!("failed to create {label}: {error}")))?;
        if let Err(error) = webview.hide() {
            debug!(label = %label, %error, "failed to hide new session webview");
        }

        if let Ok(mut history) = self.history.lock() {
            history.insert(label_text, NavHistory::default());
        }
        Ok(())
    }

    fn load(&mut self, label: &SessionLabel, url: &str) -> Result<()> {
        let target = Url::parse(url).map_err(|error| Error::InvalidUrl {
            url: url.to_string(),
            reason: error.to_string(),
        })?;
        self.webview(label)?
            .navigate(target)
            .map_err(|error| Error::host(format!("navigate failed for {label}: {error}")))
    }

    fn reload(&mut self, label: &SessionLabel) -> Result<()> {
        self.eval(label, "window.location.reload()")
    }

    fn can_go_back(&self, label: &SessionLabel) -> bool {
        self.history_of(label, NavHistory::can_go_back)
            .unwrap_or(false)
    }

    fn can_go_forward(&self, label: &SessionLabel) -> bool {
        self.history_of(label, NavHistory::can_go_forward)
            .unwrap_or(false)
    }

    fn go_back(&mut self, label: &SessionLabel) -> Result<()> {
        self.eval(label, "history.back()")
    }

    fn go_forward(&mut self, label: &SessionLabel) -> Result<()> {
        self.eval(label, "history.forward()")
    }

    fn show(&mut self, label: &SessionLabel) -> Result<()> {
        let webview = self.webview(label)?;
        webview
            .show()
            .map_err(|error| Error::host(format!("show failed for {label}: {error}")))?;
        if let Err(error) = webview.set_focus() {
            debug!(label = %label, %error, "failed to focus session webview");
        }
        Ok(())
    }

    fn hide(&mut self, label: &SessionLabel) -> Result<()> {
        self.webview(label)?
            .hide()
            .map_err(|error| Error::host(format!("hide failed for {label}: {error}")))
    }

    fn destroy(&mut self, label: &SessionLabel) -> Result<()> {
        if let Ok(mut history) = self.history.lock() {
            history.remove(&label.to_string());
        }
        self.webview(label)?
            .close()
            .map_err(|error| Error::host(format!("close failed for {label}: {error}")))
    }

    fn request_snapshot(&mut self, label: &SessionLabel, script: &str) -> Result<()> {
        self.eval(label, script)
    }
}

/// Routes a webview event into the core from a runtime task.
pub(crate) fn dispatch_host_event(app: &AppHandle, label: &str, event: HostEvent) {
    let Some(label) = SessionLabel::parse(label) else {
        debug!(label, "event from a webview that is not a session");
        return;
    };
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        let Some(state) = app.try_state::<ShellState>() else {
            return;
        };
        match state.core() {
            Ok(mut core) => core.handle_host_event(&label, event),
            Err(error) => warn!(%label, %error, "dropping host event"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_tracks_back_and_forward_through_loads() {
        let mut history = NavHistory::default();
        assert!(!history.can_go_back());

        history.record("https://app.slack.com/client");
        history.record("https://app.slack.com/client/T1/C1");
        history.record("https://app.slack.com/client/T1/C2");
        assert!(history.can_go_back());
        assert!(!history.can_go_forward());

        history.record("https://app.slack.com/client/T1/C1");
        assert!(history.can_go_back());
        assert!(history.can_go_forward());

        history.record("https://app.slack.com/client/T1/C9");
        assert!(!history.can_go_forward());
        assert_eq!(history.entries.len(), 3);
    }

    #[test]
    fn reloading_the_same_page_does_not_grow_history() {
        let mut history = NavHistory::default();
        history.record("https://discord.com/app");
        history.record("https://discord.com/app");
        assert_eq!(history.entries.len(), 1);
        assert!(!history.can_go_back());
    }
}
