// ABOUTME: Boundary to the Windows Task Scheduler service
// ABOUTME: Session traits, the service error type and the PowerShell bridge

pub mod client;
pub mod models;
pub mod xml;

use std::io;

pub use client::PowerShellTaskService;
pub use models::{
    ExecAction, InstancesPolicy, LogonType, Principal, RegisteredJob, RegistrationInfo, RunLevel,
    TaskDefinition, TaskSettings, TaskState,
};

/// Raw failure from the scheduler service, before classification.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("scheduler service unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("scheduler call failed (exit code {code:?}): {message}")]
    CallFailed { code: Option<i32>, message: String },
    #[error("failed to run PowerShell: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected response from scheduler: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

/// Entry point to the scheduler service.
pub trait TaskService {
    type Session: TaskSession;

    fn connect(&self) -> Result<Self::Session, ServiceError>;
}

/// One connected session. Calls are sequential and the caller is expected
/// to [`disconnect`](TaskSession::disconnect) on every exit path.
pub trait TaskSession {
    /// Fails with [`ServiceError::NotFound`] when the folder does not exist.
    fn open_folder(&mut self, path: &str) -> Result<(), ServiceError>;

    fn list_tasks(&mut self, folder: &str) -> Result<Vec<RegisteredJob>, ServiceError>;

    /// Creates the task or replaces an existing task of the same name,
    /// creating `folder` first if needed.
    fn register_task(
        &mut self,
        folder: &str,
        name: &str,
        definition: &TaskDefinition,
    ) -> Result<RegisteredJob, ServiceError>;

    fn delete_task(&mut self, folder: &str, name: &str) -> Result<(), ServiceError>;

    /// Removes an empty folder. Never recursive: a folder that still holds
    /// tasks is an error.
    fn delete_folder(&mut self, path: &str) -> Result<(), ServiceError>;

    fn disconnect(&mut self);
}

/// Full task path `\Folder\name`.
pub fn task_path(folder: &str, name: &str) -> String {
    format!("{}\\{}", folder.trim_end_matches('\\'), name)
}
