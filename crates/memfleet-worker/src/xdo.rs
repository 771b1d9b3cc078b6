//! Window management for worker windows via `xdotool`.
//!
//! Window IDs are the decimal strings xdotool prints.

use std::time::Duration;

use memfleet_core::{FleetError, Location, Result, WindowSize};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Run `xdotool` with the given arguments and return its stdout.
async fn xdotool(args: &[&str]) -> Result<String> {
    let command = args.first().copied().unwrap_or_default();
    let output = Command::new("xdotool")
        .args(args)
        .output()
        .await
        .map_err(|e| FleetError::window_command(command, format!("failed to run xdotool: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::window_command(command, stderr.trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn window_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

fn parse_geometry(stdout: &str) -> Option<WindowSize> {
    let mut parts = stdout.split_whitespace().map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(width)), Some(Ok(height))) => Some(WindowSize::new(width, height)),
        _ => None,
    }
}

/// Size of the screen, used as the work area when centring the grid.
#[instrument(level = "debug")]
pub async fn display_geometry() -> Result<WindowSize> {
    let stdout = xdotool(&["getdisplaygeometry"]).await?;
    parse_geometry(&stdout).ok_or_else(|| {
        let message = format!("unexpected output: {}", stdout.trim());
        FleetError::window_command("getdisplaygeometry", message)
    })
}

/// Find the first window owned by a process.
///
/// `xdotool search` exits 1 when nothing matches, which is reported as `None`.
#[instrument(level = "debug")]
pub async fn find_window(pid: u32) -> Result<Option<String>> {
    let pid = pid.to_string();
    match xdotool(&["search", "--pid", &pid]).await {
        Ok(stdout) => Ok(window_ids(&stdout).into_iter().next()),
        Err(FleetError::WindowCommand { message, .. }) if message.is_empty() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Poll [`find_window`] until the process maps a window or `timeout` elapses.
#[instrument(level = "debug")]
pub async fn wait_for_window(
    pid: u32,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(window) = find_window(pid).await? {
            return Ok(Some(window));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Find every window whose title matches `name`.
#[instrument(level = "debug")]
pub async fn find_windows_by_name(name: &str) -> Result<Vec<String>> {
    match xdotool(&["search", "--name", name]).await {
        Ok(stdout) => Ok(window_ids(&stdout)),
        Err(FleetError::WindowCommand { message, .. }) if message.is_empty() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Move a window to a screen position.
#[instrument(level = "debug")]
pub async fn move_window(window: &str, location: Location) -> Result<()> {
    let x = location.x.to_string();
    let y = location.y.to_string();
    xdotool(&["windowmove", window, &x, &y]).await?;
    debug!("Moved window {} to {}", window, location);
    Ok(())
}

/// Minimise a window.
#[instrument(level = "debug")]
pub async fn minimise(window: &str) -> Result<()> {
    xdotool(&["windowminimize", window]).await?;
    Ok(())
}

/// Restore and raise a window.
#[instrument(level = "debug")]
pub async fn activate(window: &str) -> Result<()> {
    xdotool(&["windowactivate", window]).await?;
    Ok(())
}

/// Send a key press to a window.
#[instrument(level = "debug")]
pub async fn send_key(window: &str, key: &str) -> Result<()> {
    xdotool(&["key", "--window", window, key]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_ids_parsing() {
        assert_eq!(window_ids("123\n456\n"), vec!["123", "456"]);
        assert_eq!(window_ids("  789  \n\n"), vec!["789"]);
        assert!(window_ids("Defaulting to search window name\n").is_empty());
    }

    #[test]
    fn test_display_geometry_parsing() {
        assert_eq!(parse_geometry("1920 1080\n"), Some(WindowSize::new(1920, 1080)));
        assert_eq!(parse_geometry("2560 1440"), Some(WindowSize::new(2560, 1440)));
        assert_eq!(parse_geometry("1920\n"), None);
        assert_eq!(parse_geometry("Can't open display"), None);
    }

    #[tokio::test]
    #[ignore = "requires xdotool and an X display"]
    async fn test_find_window_for_missing_pid() {
        let window = find_window(u32::MAX).await.unwrap();
        assert!(window.is_none());
    }
}
