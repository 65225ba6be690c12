// ABOUTME: User-chosen parameters for one recurring backup job
// ABOUTME: Range checks run here before anything is sent to the scheduler

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::identity::sanitize;

pub const MAX_HOUR: u8 = 23;
/// Day-of-month is 0-indexed, so 30 selects the 31st.
pub const MAX_DAY_OF_MONTH: u8 = 30;
/// Day-of-week counts from Sunday = 0.
pub const MAX_DAY_OF_WEEK: u8 = 6;
pub const MAX_RETENTION_LIMIT: u8 = 10;

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    #[error("invalid hour {0}, expected 0-{MAX_HOUR}")]
    Hour(u8),
    #[error("invalid day of month {0}, expected 0-{MAX_DAY_OF_MONTH}")]
    DayOfMonth(u8),
    #[error("invalid day of week {0}, expected 0-{MAX_DAY_OF_WEEK}")]
    DayOfWeek(u8),
    #[error("invalid backup limit {0}, expected 0 (unlimited) or 1-{MAX_RETENTION_LIMIT}")]
    RetentionLimit(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalKind {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IntervalKind::Daily => write!(f, "Daily"),
            IntervalKind::Weekly => write!(f, "Weekly"),
            IntervalKind::Monthly => write!(f, "Monthly"),
        }
    }
}

/// Everything needed to register one backup job.
///
/// `day_of_week` is only read for [`IntervalKind::Weekly`] and
/// `day_of_month` only for [`IntervalKind::Monthly`]. `retention_limit` is
/// ignored when `overwrite` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJobSpec {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub interval: IntervalKind,
    #[serde(default)]
    pub day_of_week: u8,
    #[serde(default)]
    pub day_of_month: u8,
    pub start_hour: u8,
    #[serde(default)]
    pub retention_limit: u8,
    #[serde(default)]
    pub overwrite: bool,
}

impl BackupJobSpec {
    pub fn daily(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, hour: u8) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            interval: IntervalKind::Daily,
            day_of_week: 0,
            day_of_month: 0,
            start_hour: hour,
            retention_limit: 0,
            overwrite: false,
        }
    }

    pub fn weekly(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        day_of_week: u8,
        hour: u8,
    ) -> Self {
        Self {
            interval: IntervalKind::Weekly,
            day_of_week,
            ..Self::daily(source, destination, hour)
        }
    }

    pub fn monthly(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        day_of_month: u8,
        hour: u8,
    ) -> Self {
        Self {
            interval: IntervalKind::Monthly,
            day_of_month,
            ..Self::daily(source, destination, hour)
        }
    }

    pub fn with_retention_limit(mut self, limit: u8) -> Self {
        self.retention_limit = limit;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Checks every range constraint, whichever interval is selected.
    pub fn validate(&self) -> Result<(), ParameterError> {
        validate_schedule(self.day_of_month, self.day_of_week, self.start_hour)?;
        if self.retention_limit > MAX_RETENTION_LIMIT {
            return Err(ParameterError::RetentionLimit(self.retention_limit));
        }
        Ok(())
    }

    /// Limit the generated script enforces: 0 (keep everything) whenever
    /// backups overwrite each other.
    pub fn effective_retention(&self) -> u8 {
        if self.overwrite {
            0
        } else {
            self.retention_limit
        }
    }

    pub fn source_str(&self) -> String {
        self.source.to_string_lossy().into_owned()
    }

    pub fn destination_str(&self) -> String {
        self.destination.to_string_lossy().into_owned()
    }

    /// Directory name the copy lands in under the destination.
    pub fn folder_name(&self) -> String {
        folder_name(&self.source)
    }
}

pub(crate) fn validate_schedule(
    day_of_month: u8,
    day_of_week: u8,
    hour: u8,
) -> Result<(), ParameterError> {
    if hour > MAX_HOUR {
        return Err(ParameterError::Hour(hour));
    }
    if day_of_month > MAX_DAY_OF_MONTH {
        return Err(ParameterError::DayOfMonth(day_of_month));
    }
    if day_of_week > MAX_DAY_OF_WEEK {
        return Err(ParameterError::DayOfWeek(day_of_week));
    }
    Ok(())
}

/// Last path component of `source`, accepting either separator.
///
/// A drive root such as `D:\` has no component after the separator, so the
/// drive itself is used, sanitized into something a directory can be named.
pub fn folder_name(source: &Path) -> String {
    let raw = source.to_string_lossy();
    let trimmed = raw.trim_end_matches(['\\', '/']);
    let last = trimmed.rsplit(['\\', '/']).next().unwrap_or(trimmed);
    sanitize(last)
}

/// `HH:00` label for an hour selector.
pub fn hour_label(hour: u8) -> String {
    format!("{hour:02}:00")
}
