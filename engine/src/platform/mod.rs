//! Platform-specific application launching
//!
//! Notepad and Calculator only exist on Windows. The browser is opened
//! through the platform's URL handler everywhere:
//! - Windows: `cmd /C start`
//! - macOS: `open`
//! - Other Unix: `xdg-open`

use std::fmt;
use std::process::{Command, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Page opened by the browser command
pub const BROWSER_HOME: &str = "https://www.google.com";

/// Applications the assistant can open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppTarget {
    Notepad,
    Calculator,
    Browser,
}

impl AppTarget {
    /// Match an `open <app>` phrase anywhere in lowercase text
    pub fn from_phrase(lowered: &str) -> Option<Self> {
        if lowered.contains("open notepad") {
            Some(Self::Notepad)
        } else if lowered.contains("open calculator") {
            Some(Self::Calculator)
        } else if lowered.contains("open chrome") {
            Some(Self::Browser)
        } else {
            None
        }
    }

    /// Whether the target can be launched on this platform
    pub fn is_supported(self) -> bool {
        match self {
            Self::Notepad | Self::Calculator => cfg!(windows),
            Self::Browser => true,
        }
    }
}

impl fmt::Display for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notepad => write!(f, "Notepad"),
            Self::Calculator => write!(f, "Calculator"),
            Self::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0} is only available on Windows")]
    Unsupported(AppTarget),

    #[error("Failed to launch {0}: {1}")]
    Spawn(AppTarget, String),
}

pub trait AppLauncher: Send + Sync {
    /// Start `target` without waiting for it to exit
    fn launch(&self, target: AppTarget) -> Result<(), LaunchError>;
}

/// Launches real applications on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    fn command(target: AppTarget) -> Option<Command> {
        match target {
            AppTarget::Browser => Some(browser_command(BROWSER_HOME)),
            #[cfg(windows)]
            AppTarget::Notepad => Some(Command::new("notepad.exe")),
            #[cfg(windows)]
            AppTarget::Calculator => Some(Command::new("calc.exe")),
            #[cfg(not(windows))]
            AppTarget::Notepad | AppTarget::Calculator => None,
        }
    }
}

impl AppLauncher for SystemLauncher {
    fn launch(&self, target: AppTarget) -> Result<(), LaunchError> {
        let command = Self::command(target).ok_or(LaunchError::Unsupported(target))?;
        spawn_reaped(target, command)?;

        info!("Launched {}", target);
        Ok(())
    }
}

/// Spawn `command` and wait for it on a detached thread so it never lingers
/// as a zombie
fn spawn_reaped(
    target: AppTarget,
    mut command: Command,
) -> Result<thread::JoinHandle<()>, LaunchError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| LaunchError::Spawn(target, e.to_string()))?;

    Ok(thread::spawn(move || match child.wait() {
        Ok(status) => debug!("{} exited with {}", target, status),
        Err(e) => warn!("Failed to wait for {}: {}", target, e),
    }))
}

#[cfg(windows)]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", "", url]);
    cmd
}

#[cfg(target_os = "macos")]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(all(unix, not(target_os = "macos")))]
fn browser_command(url: &str) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_matching() {
        assert_eq!(AppTarget::from_phrase("please open notepad now"), Some(AppTarget::Notepad));
        assert_eq!(AppTarget::from_phrase("open calculator"), Some(AppTarget::Calculator));
        assert_eq!(AppTarget::from_phrase("can you open chrome"), Some(AppTarget::Browser));
        assert_eq!(AppTarget::from_phrase("open the door"), None);
    }

    #[test]
    fn test_browser_always_supported() {
        assert!(AppTarget::Browser.is_supported());
    }

    #[cfg(unix)]
    #[test]
    fn test_launched_process_is_reaped() {
        let reaper = spawn_reaped(AppTarget::Browser, Command::new("true")).unwrap();
        reaper.join().unwrap();
    }

    #[test]
    fn test_spawn_failure_reported() {
        let result = spawn_reaped(
            AppTarget::Browser,
            Command::new("/nonexistent/sophie-launcher"),
        );
        assert!(matches!(result, Err(LaunchError::Spawn(AppTarget::Browser, _))));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_windows_apps_unsupported_elsewhere() {
        let launcher = SystemLauncher;
        assert!(matches!(
            launcher.launch(AppTarget::Notepad),
            Err(LaunchError::Unsupported(AppTarget::Notepad))
        ));
        assert!(matches!(
            launcher.launch(AppTarget::Calculator),
            Err(LaunchError::Unsupported(AppTarget::Calculator))
        ));
    }
}
