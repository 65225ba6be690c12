// ABOUTME: Application settings loaded from an optional TOML file
// ABOUTME: Controls the task folder, toast identity and interpreter lookup

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TASK_FOLDER: &str = "\\GoBackup";
pub const DEFAULT_APP_TITLE: &str = "GoBackup";
pub const DEFAULT_TOAST_EXPIRATION_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Task Scheduler folder holding every backup task.
    pub folder: String,
    /// Toast notifier id and task author.
    pub app_title: String,
    pub toast_expiration_minutes: u32,
    /// Overrides `%SYSTEMDRIVE%` when locating powershell.exe for tasks.
    pub system_drive: Option<String>,
    /// PowerShell used by this tool to talk to the scheduler.
    pub powershell: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            folder: DEFAULT_TASK_FOLDER.to_owned(),
            app_title: DEFAULT_APP_TITLE.to_owned(),
            toast_expiration_minutes: DEFAULT_TOAST_EXPIRATION_MINUTES,
            system_drive: None,
            powershell: None,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.folder.starts_with('\\') || self.folder.len() < 2 {
            anyhow::bail!(
                "Task folder must be an absolute scheduler path such as \\GoBackup, got {:?}",
                self.folder
            );
        }
        if self.app_title.trim().is_empty() {
            anyhow::bail!("app_title must not be empty");
        }
        Ok(())
    }
}

/// Windows PowerShell under the given system drive.
pub fn powershell_under(system_drive: &str) -> String {
    format!(
        "{}\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe",
        system_drive.trim_end_matches('\\')
    )
}
