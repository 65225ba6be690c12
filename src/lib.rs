// ABOUTME: Library root for scheduling recurring folder backups in Windows Task Scheduler
// ABOUTME: Exposes job modelling, trigger and script generation, and the job registry

pub mod config;
pub mod error;
pub mod job;
pub mod registry;
pub mod scheduler;
pub mod script;
pub mod trigger;

pub use config::Settings;
pub use error::{ErrorKind, ScheduleError};
pub use job::{BackupJobSpec, IntervalKind, JobDocumentation, JobIdentity};
pub use registry::JobRegistry;
pub use scheduler::{PowerShellTaskService, RegisteredJob, TaskService, TaskSession};
pub use script::{render_script, GeneratedScript};
pub use trigger::{build_trigger, RecurrenceTrigger};
