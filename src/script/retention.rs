// ABOUTME: Rotated backup naming and oldest-first pruning selection
// ABOUTME: Mirrors the rename and prune phases of the generated script

use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// chrono format of the rotation suffix.
pub const ROTATION_FORMAT: &str = "%Y%m%d_%H%M%S";
/// The same format in .NET notation, used by the script.
pub const ROTATION_FORMAT_DOTNET: &str = "yyyyMMdd_HHmmss";
/// Regex the script matches after `{folder}-` when listing old backups.
pub const ROTATION_PATTERN: &str = r"20\d{6}_\d{6}";

pub fn rotated_name(folder: &str, at: NaiveDateTime) -> String {
    format!("{folder}-{}", at.format(ROTATION_FORMAT))
}

/// Same test as [`ROTATION_PATTERN`]: `{folder}-20dddddd_dddddd`.
///
/// The folder prefix compares case-insensitively, like PowerShell `-match`
/// and like Windows folder names.
pub fn is_rotated_name(folder: &str, name: &str) -> bool {
    let (Some(prefix), Some(rest)) = (name.get(..folder.len()), name.get(folder.len()..)) else {
        return false;
    };
    if prefix.to_lowercase() != folder.to_lowercase() {
        return false;
    }
    let Some(suffix) = rest.strip_prefix('-') else {
        return false;
    };
    let bytes = suffix.as_bytes();
    bytes.len() == 15
        && bytes.starts_with(b"20")
        && bytes[8] == b'_'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedBackup {
    pub path: PathBuf,
    pub created: SystemTime,
}

impl RotatedBackup {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn created_local(&self) -> DateTime<Local> {
        DateTime::<Local>::from(self.created)
    }
}

/// Picks the backups the next run would delete.
///
/// Backups are ordered by creation time, oldest first, and everything
/// beyond the newest `limit` is selected. A limit of 0 keeps everything.
pub fn select_for_pruning(backups: &[RotatedBackup], limit: usize) -> Vec<&RotatedBackup> {
    if limit == 0 || backups.len() <= limit {
        return Vec::new();
    }
    let mut ordered: Vec<&RotatedBackup> = backups.iter().collect();
    ordered.sort_by_key(|b| b.created);
    ordered.truncate(backups.len() - limit);
    ordered
}

/// Lists the rotated copies of `folder` directly under `destination`.
pub fn scan_rotated(destination: &Path, folder: &str) -> io::Result<Vec<RotatedBackup>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(destination)? {
        let entry = entry?;
        let name = entry.file_name();
        if !is_rotated_name(folder, &name.to_string_lossy()) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_dir() {
            continue;
        }
        // Not every filesystem records a birth time.
        let created = meta.created().or_else(|_| meta.modified())?;
        found.push(RotatedBackup {
            path: entry.path(),
            created,
        });
    }
    Ok(found)
}
