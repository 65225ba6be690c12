// ABOUTME: Backup job parameters, task naming and display metadata
// ABOUTME: Everything here is local and never talks to the scheduler

pub mod documentation;
pub mod identity;
pub mod spec;

pub use documentation::{DocumentationError, JobDocumentation};
pub use identity::{sanitize, JobIdentity};
pub use spec::{hour_label, BackupJobSpec, IntervalKind, ParameterError, WEEKDAY_NAMES};
