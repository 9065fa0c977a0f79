#[cfg(target_os = "macos")]
use std::thread;

use chattio_core::unread::{badge_label, NativeNotification, UnreadSummary};
#[cfg(target_os = "macos")]
use mac_notification_sys::{MainButton, Notification, NotificationResponse};
use tauri::{AppHandle, Emitter, Manager};
use tracing::{debug, warn};

use crate::consts::{MAIN_WINDOW, TRAY_ID, UI_WEBVIEW};
#[cfg(target_os = "macos")]
use crate::ui_shell;

/// Shows a native notification; elsewhere the UI webview gets the event and
/// uses the web notification API.
pub(crate) fn show_notification(app: &AppHandle, notification: NativeNotification) {
    if let Err(error) = app.emit_to(UI_WEBVIEW, "native-notification", &notification) {
        debug!(%error, "failed to emit native-notification");
    }
    #[cfg(target_os = "macos")]
    send_macos_notification(app.clone(), notification);
}

#[cfg(target_os = "macos")]
fn send_macos_notification(app: AppHandle, notification: NativeNotification) {
    thread::spawn(move || {
        ensure_macos_notification_application();

        let mut native = Notification::new();
        native
            .title(&notification.title)
            .message(&notification.body)
            .main_button(MainButton::SingleAction("Open"))
            .close_button("Dismiss")
            .wait_for_click(true)
            .asynchronous(false);
        if !notification.silent {
            native.default_sound();
        }

        match native.send() {
            Ok(NotificationResponse::Click) | Ok(NotificationResponse::ActionButton(_)) => {
                ui_shell::show_main_window(&app);
                let _ = app.emit_to(UI_WEBVIEW, "notification-clicked", &notification);
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "failed to show macOS notification");
            }
        }
    });
}

#[cfg(target_os = "macos")]
fn ensure_macos_notification_application() {
    static INIT_NOTIFICATION_APP: std::sync::Once = std::sync::Once::new();
    INIT_NOTIFICATION_APP.call_once(|| {
        for bundle_id in ["app.chattio.desktop", "com.apple.Finder"] {
            match mac_notification_sys::set_application(bundle_id) {
                Ok(_) => return,
                Err(error) => {
                    debug!(bundle_id, %error, "failed to set notification bundle id");
                }
            }
        }
    });
}

/// Dock/taskbar badge and tray title for the current summary. A zero total
/// clears both.
pub(crate) fn apply_badge(app: &AppHandle, summary: &UnreadSummary) {
    let total = summary.total_messages;

    if let Some(window) = app.get_window(MAIN_WINDOW) {
        let count = (total > 0).then_some(i64::from(total));
        if let Err(error) = window.set_badge_count(count) {
            debug!(%error, "failed to set badge count");
        }
    }

    if let Some(tray) = app.tray_by_id(TRAY_ID) {
        let tooltip = tray_tooltip(summary);
        if let Err(error) = tray.set_tooltip(Some(tooltip.as_str())) {
            debug!(%error, "failed to set tray tooltip");
        }
        #[cfg(target_os = "macos")]
        if let Err(error) = tray.set_title(badge_label(total, 99).as_deref()) {
            debug!(%error, "failed to set tray title");
        }
    }
}

fn tray_tooltip(summary: &UnreadSummary) -> String {
    match (summary.total_messages, summary.affected_platform_count) {
        (0, _) => "Chattio".to_string(),
        (1, _) => "Chattio: 1 unread message".to_string(),
        (total, 1) => format!("Chattio: {total} unread messages"),
        (total, services) => format!("Chattio: {total} unread in {services} services"),
    }
}

/// Label the sidebar shows next to a platform.
pub(crate) fn sidebar_badge(count: u32) -> Option<String> {
    badge_label(count, 9)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total: u32, services: u32) -> UnreadSummary {
        UnreadSummary {
            total_messages: total,
            affected_platform_count: services,
            ..UnreadSummary::default()
        }
    }

    #[test]
    fn tooltip_reflects_totals() {
        assert_eq!(tray_tooltip(&summary(0, 0)), "Chattio");
        assert_eq!(tray_tooltip(&summary(1, 1)), "Chattio: 1 unread message");
        assert_eq!(tray_tooltip(&summary(4, 1)), "Chattio: 4 unread messages");
        assert_eq!(tray_tooltip(&summary(7, 3)), "Chattio: 7 unread in 3 services");
    }

    #[test]
    fn sidebar_badge_caps_at_nine() {
        assert_eq!(sidebar_badge(0), None);
        assert_eq!(sidebar_badge(9).as_deref(), Some("9"));
        assert_eq!(sidebar_badge(12).as_deref(), Some("9+"));
    }
}
