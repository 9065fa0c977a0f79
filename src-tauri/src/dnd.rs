use tauri::menu::MenuItem;
use tauri::{AppHandle, Emitter, Manager};
use tracing::{debug, info};

use crate::{
    consts::UI_WEBVIEW,
    model::{DndStateResponse, ShellState, TrayDndMenuState},
};

pub(crate) const DND_STATUS_ID: &str = "dnd_status";
pub(crate) const DND_TOGGLE_ID: &str = "dnd_toggle";

pub(crate) fn create_dnd_menu_items(app: &AppHandle) -> Result<TrayDndMenuState, tauri::Error> {
    let status_item = MenuItem::with_id(
        app,
        DND_STATUS_ID,
        "Notifications: On",
        false,
        None::<&str>,
    )?;
    let toggle_item = MenuItem::with_id(
        app,
        DND_TOGGLE_ID,
        "Turn On Do Not Disturb",
        true,
        None::<&str>,
    )?;
    Ok(TrayDndMenuState {
        status_item,
        toggle_item,
    })
}

pub(crate) fn install_dnd_menu_state(app: &AppHandle, items: TrayDndMenuState) {
    let state = app.state::<ShellState>();
    if let Ok(mut menu) = state.tray_dnd_menu.lock() {
        *menu = Some(items);
    }
}

pub(crate) fn current_state(app: &AppHandle) -> Result<DndStateResponse, String> {
    let state = app.state::<ShellState>();
    let general = state.core()?.settings().general();
    Ok(DndStateResponse::from_general(&general))
}

pub(crate) fn set_do_not_disturb(
    app: &AppHandle,
    enabled: bool,
) -> Result<DndStateResponse, String> {
    let state = app.state::<ShellState>();
    let general = state
        .core()?
        .update_general(|general| general.do_not_disturb = enabled)
        .map_err(|error| error.to_string())?;
    info!(enabled, "do not disturb toggled");

    let dnd = DndStateResponse::from_general(&general);
    apply_dnd_state_to_tray(app, &dnd);
    if let Err(error) = app.emit_to(UI_WEBVIEW, "dnd-state", &dnd) {
        debug!(%error, "failed to emit dnd-state");
    }
    Ok(dnd)
}

pub(crate) fn toggle_do_not_disturb(app: &AppHandle) -> Result<DndStateResponse, String> {
    let manual = current_state(app)?.manual;
    set_do_not_disturb(app, !manual)
}

/// Re-evaluates the schedule so the tray follows the clock.
pub(crate) fn refresh_tray(app: &AppHandle) {
    match current_state(app) {
        Ok(dnd) => apply_dnd_state_to_tray(app, &dnd),
        Err(error) => debug!(%error, "failed to read do-not-disturb state"),
    }
}

fn status_label(dnd: &DndStateResponse) -> String {
    match (dnd.active, dnd.manual) {
        (false, _) => "Notifications: On".to_string(),
        (true, true) => "Notifications: Do Not Disturb".to_string(),
        (true, false) => format!("Notifications: Quiet until {}", dnd.end),
    }
}

pub(crate) fn apply_dnd_state_to_tray(app: &AppHandle, dnd: &DndStateResponse) {
    let state = app.state::<ShellState>();
    let handles = state
        .tray_dnd_menu
        .lock()
        .ok()
        .and_then(|guard| guard.clone());

    let Some(handles) = handles else {
        return;
    };

    let _ = handles.status_item.set_text(status_label(dnd));
    let _ = handles.toggle_item.set_text(if dnd.manual {
        "Turn Off Do Not Disturb"
    } else {
        "Turn On Do Not Disturb"
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dnd(active: bool, manual: bool) -> DndStateResponse {
        DndStateResponse {
            manual,
            scheduled: !manual,
            active,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }

    #[test]
    fn status_names_the_reason_for_silence() {
        assert_eq!(status_label(&dnd(false, false)), "Notifications: On");
        assert_eq!(status_label(&dnd(true, true)), "Notifications: Do Not Disturb");
        assert_eq!(
            status_label(&dnd(true, false)),
            "Notifications: Quiet until 08:00"
        );
    }
}
