//! Side effects of settings that live outside the core: login item
//! registration and the webview compositing switch.

#[cfg(target_os = "macos")]
use std::{fs, path::PathBuf, process::Command};

use chattio_core::settings::PerformanceSettings;
use tracing::{debug, info};

use crate::consts::LAUNCH_AGENT_LABEL;

/// Disables GPU compositing for webviews created after this call.
pub(crate) fn apply_hardware_acceleration(perf: &PerformanceSettings) {
    if perf.hardware_acceleration {
        return;
    }
    info!("hardware acceleration disabled for webviews");
    #[cfg(target_os = "linux")]
    std::env::set_var("WEBKIT_DISABLE_COMPOSITING_MODE", "1");
    #[cfg(target_os = "windows")]
    std::env::set_var(
        "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS",
        "--disable-gpu --disable-gpu-compositing",
    );
}

#[cfg(target_os = "macos")]
fn launch_agent_plist_path() -> Result<PathBuf, String> {
    let home = std::env::var("HOME").map_err(|error| format!("HOME is not set: {error}"))?;
    let launch_agents_dir = PathBuf::from(home).join("Library/LaunchAgents");
    fs::create_dir_all(&launch_agents_dir)
        .map_err(|error| format!("Failed to create LaunchAgents dir: {error}"))?;
    Ok(launch_agents_dir.join(format!("{LAUNCH_AGENT_LABEL}.plist")))
}

#[cfg(target_os = "macos")]
pub(crate) fn apply_launch_at_login(enabled: bool) -> Result<(), String> {
    let plist_path = launch_agent_plist_path()?;
    if !enabled {
        let _ = Command::new("launchctl")
            .arg("unload")
            .arg("-w")
            .arg(&plist_path)
            .output();
        if plist_path.exists() {
            let _ = fs::remove_file(&plist_path);
        }
        debug!("launch agent removed");
        return Ok(());
    }

    let exe = std::env::current_exe()
        .map_err(|error| format!("Failed to resolve app executable: {error}"))?;
    let plist = launch_agent_plist(&exe.to_string_lossy());
    fs::write(&plist_path, plist)
        .map_err(|error| format!("Failed to write launch agent: {error}"))?;

    let _ = Command::new("launchctl")
        .arg("load")
        .arg("-w")
        .arg(&plist_path)
        .output();
    debug!(path = %plist_path.display(), "launch agent installed");

    Ok(())
}

#[cfg(not(target_os = "macos"))]
pub(crate) fn apply_launch_at_login(enabled: bool) -> Result<(), String> {
    debug!(enabled, "launch at login is only managed on macOS");
    Ok(())
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn launch_agent_plist(executable: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{}</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
</dict>
</plist>
"#,
        LAUNCH_AGENT_LABEL,
        xml_escape(executable)
    )
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plist_escapes_the_executable_path() {
        let plist = launch_agent_plist("/Applications/A & B/Chattio");
        assert!(plist.contains("<string>/Applications/A &amp; B/Chattio</string>"));
        assert!(plist.contains("<key>RunAtLoad</key>"));
    }
}
