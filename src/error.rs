// ABOUTME: Classified error type returned by every scheduler-facing operation
// ABOUTME: Wraps service, trigger and environment failures into a closed set of kinds

use std::fmt;

/// Boxed underlying cause attached to a [`ScheduleError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The fixed set of failure kinds a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectFailure,
    RetrieveFolderFailure,
    RetrieveTasksFailure,
    CreateTaskFailure,
    DeleteTaskFailure,
    DeleteFolderFailure,
    InvalidScheduleParameter,
    DirectoryNotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::ConnectFailure => write!(f, "Connection error"),
            ErrorKind::RetrieveFolderFailure => write!(f, "Task folder error"),
            ErrorKind::RetrieveTasksFailure => write!(f, "Task listing error"),
            ErrorKind::CreateTaskFailure => write!(f, "Create error"),
            ErrorKind::DeleteTaskFailure => write!(f, "Delete error"),
            ErrorKind::DeleteFolderFailure => write!(f, "Folder delete error"),
            ErrorKind::InvalidScheduleParameter => write!(f, "Invalid schedule"),
            ErrorKind::DirectoryNotFound => write!(f, "Directory not found"),
        }
    }
}

/// Caption and text shown to the user when an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPrompt {
    pub title: &'static str,
    pub body: &'static str,
    /// Whether offering "try again" makes sense for this kind.
    pub retryable: bool,
}

impl ErrorKind {
    /// Service-side failures may succeed on a second attempt; local
    /// validation failures never will.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidScheduleParameter | ErrorKind::DirectoryNotFound
        )
    }

    pub fn prompt(self) -> ErrorPrompt {
        let (title, body) = match self {
            ErrorKind::ConnectFailure => (
                "Connection Error",
                "Could not connect to the windows task scheduler",
            ),
            ErrorKind::RetrieveFolderFailure | ErrorKind::RetrieveTasksFailure => (
                "Fetch Error",
                "Could not fetch the scheduled backup tasks",
            ),
            ErrorKind::CreateTaskFailure => (
                "Create Error",
                "Could not create the scheduled backup task",
            ),
            ErrorKind::DeleteTaskFailure => (
                "Delete Error",
                "Could not delete the scheduled backup task",
            ),
            ErrorKind::DeleteFolderFailure => {
                ("Delete Error", "Could not delete the task folder")
            }
            ErrorKind::InvalidScheduleParameter => (
                "Invalid Schedule",
                "The selected hour, day or backup limit is out of range",
            ),
            ErrorKind::DirectoryNotFound => (
                "Folder Not Found",
                "The source or destination folder does not exist",
            ),
        };
        ErrorPrompt {
            title,
            body,
            retryable: self.is_retryable(),
        }
    }
}

/// A failure from the orchestration layer, tagged with its [`ErrorKind`]
/// and carrying the original cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScheduleError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: BoxError,
}

impl ScheduleError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Classifies the error side of a `Result` at the point of failure.
pub trait Classify<T> {
    fn classify(self, kind: ErrorKind, message: &str) -> Result<T, ScheduleError>;
}

impl<T, E> Classify<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn classify(self, kind: ErrorKind, message: &str) -> Result<T, ScheduleError> {
        self.map_err(|e| ScheduleError::new(kind, message, e))
    }
}
