use std::process::Command;

use tauri::{AppHandle, LogicalPosition, LogicalSize, Manager, Runtime, Window, WindowEvent};
use tracing::debug;
use url::Url;

use crate::consts::{MAIN_WINDOW, SIDEBAR_WIDTH, UI_WEBVIEW};

pub(crate) fn show_main_window<R: Runtime>(app: &AppHandle<R>) {
    if let Some(window) = app.get_window(MAIN_WINDOW) {
        let _ = window.show();
        let _ = window.unminimize();
        let _ = window.set_focus();
    }
}

pub(crate) fn toggle_main_window<R: Runtime>(app: &AppHandle<R>) {
    if let Some(window) = app.get_window(MAIN_WINDOW) {
        if window.is_visible().unwrap_or(false) {
            let _ = window.hide();
        } else {
            let _ = window.show();
            let _ = window.unminimize();
            let _ = window.set_focus();
        }
    }
}

pub(crate) fn handle_window_event<R: Runtime>(window: &Window<R>, event: &WindowEvent) {
    if window.label() != MAIN_WINDOW {
        return;
    }
    match event {
        WindowEvent::CloseRequested { api, .. } => {
            api.prevent_close();
            let _ = window.hide();
        }
        WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => layout_webviews(window),
        _ => {}
    }
}

/// Sidebar on the left at a fixed width; sessions fill the rest.
pub(crate) fn session_size(
    width: f64,
    height: f64,
    sidebar: f64,
) -> (LogicalPosition<f64>, LogicalSize<f64>) {
    (
        LogicalPosition::new(sidebar, 0.0),
        LogicalSize::new((width - sidebar).max(0.0), height.max(0.0)),
    )
}

fn logical_inner_size<R: Runtime>(window: &Window<R>) -> tauri::Result<LogicalSize<f64>> {
    let scale = window.scale_factor()?;
    Ok(window.inner_size()?.to_logical(scale))
}

pub(crate) fn session_bounds<R: Runtime>(
    window: &Window<R>,
) -> tauri::Result<(LogicalPosition<f64>, LogicalSize<f64>)> {
    let size = logical_inner_size(window)?;
    Ok(session_size(size.width, size.height, SIDEBAR_WIDTH))
}

pub(crate) fn sidebar_bounds<R: Runtime>(
    window: &Window<R>,
) -> tauri::Result<(LogicalPosition<f64>, LogicalSize<f64>)> {
    let size = logical_inner_size(window)?;
    Ok((
        LogicalPosition::new(0.0, 0.0),
        LogicalSize::new(SIDEBAR_WIDTH.min(size.width), size.height),
    ))
}

pub(crate) fn layout_webviews<R: Runtime>(window: &Window<R>) {
    let (Ok((sidebar_pos, sidebar_size)), Ok((session_pos, session_size))) =
        (sidebar_bounds(window), session_bounds(window))
    else {
        return;
    };
    for webview in window.webviews() {
        let (position, size) = if webview.label() == UI_WEBVIEW {
            (sidebar_pos, sidebar_size)
        } else {
            (session_pos, session_size)
        };
        if let Err(error) = webview
            .set_position(position)
            .and_then(|()| webview.set_size(size))
        {
            debug!(label = webview.label(), %error, "failed to lay out webview");
        }
    }
}

/// Opens `http`, `https` and `mailto` URLs with the system handler.
pub(crate) fn open_external_url(url: &str) -> Result<(), String> {
    let candidate = url.trim();
    if candidate.is_empty() {
        return Err("Missing URL".to_string());
    }
    let parsed = Url::parse(candidate).map_err(|error| format!("Invalid URL: {error}"))?;
    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" && scheme != "mailto" {
        return Err(format!("Unsupported URL scheme: {scheme}"));
    }

    #[cfg(target_os = "macos")]
    let status = Command::new("open").arg(parsed.as_str()).status();
    #[cfg(target_os = "linux")]
    let status = Command::new("xdg-open").arg(parsed.as_str()).status();
    #[cfg(target_os = "windows")]
    let status = Command::new("cmd")
        .arg("/C")
        .arg("start")
        .arg("")
        .arg(parsed.as_str())
        .status();

    let status = status.map_err(|error| format!("Failed to open URL: {error}"))?;
    if !status.success() {
        return Err(format!(
            "Failed to open URL (exit code {})",
            status.code().unwrap_or(-1)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_area_sits_right_of_the_sidebar() {
        let (position, size) = session_size(1200.0, 800.0, 72.0);
        assert_eq!(position, LogicalPosition::new(72.0, 0.0));
        assert_eq!(size, LogicalSize::new(1128.0, 800.0));

        let (_, tiny) = session_size(50.0, 800.0, 72.0);
        assert_eq!(tiny.width, 0.0);
    }

    #[test]
    fn refuses_non_web_schemes() {
        assert_eq!(
            open_external_url("file:///etc/passwd"),
            Err("Unsupported URL scheme: file".to_string())
        );
        assert_eq!(open_external_url("   "), Err("Missing URL".to_string()));
        assert!(open_external_url("not a url")
            .unwrap_err()
            .starts_with("Invalid URL"));
    }
}
