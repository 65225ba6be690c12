// ABOUTME: Encodes job parameters into the task's free-text Documentation field
// ABOUTME: Pipe-delimited: source|destination[|limit-or-dash|Yes/No]

use std::fmt;

use super::spec::BackupJobSpec;

const SEPARATOR: char = '|';
const NO_LIMIT_MARKER: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("documentation field {0:?} does not contain source and destination")]
pub struct DocumentationError(pub String);

/// Display metadata carried through the scheduler alongside a task.
///
/// The third and fourth fields were added later; tasks registered without
/// them decode with `retention_limit` and `overwrite` set to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDocumentation {
    pub source: String,
    pub destination: String,
    /// `None` when unknown or when backups overwrite each other.
    pub retention_limit: Option<u8>,
    pub overwrite: Option<bool>,
}

impl JobDocumentation {
    pub fn from_spec(spec: &BackupJobSpec) -> Self {
        Self {
            source: spec.source_str(),
            destination: spec.destination_str(),
            retention_limit: (!spec.overwrite).then_some(spec.retention_limit),
            overwrite: Some(spec.overwrite),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = format!("{}{SEPARATOR}{}", self.source, self.destination);
        if let Some(overwrite) = self.overwrite {
            let limit = match self.retention_limit {
                Some(limit) if !overwrite => limit.to_string(),
                _ => NO_LIMIT_MARKER.to_owned(),
            };
            let yes_no = if overwrite { "Yes" } else { "No" };
            out.push_str(&format!("{SEPARATOR}{limit}{SEPARATOR}{yes_no}"));
        }
        out
    }

    pub fn decode(raw: &str) -> Result<Self, DocumentationError> {
        let mut fields = raw.split(SEPARATOR);
        let (Some(source), Some(destination)) = (fields.next(), fields.next()) else {
            return Err(DocumentationError(raw.to_owned()));
        };
        let retention_limit = fields.next().and_then(|f| f.trim().parse::<u8>().ok());
        let overwrite = match fields.next().map(str::trim) {
            Some("Yes") => Some(true),
            Some("No") => Some(false),
            _ => None,
        };
        Ok(Self {
            source: source.to_owned(),
            destination: destination.to_owned(),
            retention_limit,
            overwrite,
        })
    }

    /// Limit column text: `-` for overwrite jobs, `∞` for unlimited, `?` if unknown.
    pub fn limit_label(&self) -> String {
        match (self.overwrite, self.retention_limit) {
            (Some(true), _) => NO_LIMIT_MARKER.to_owned(),
            (_, Some(0)) => "∞".to_owned(),
            (_, Some(limit)) => limit.to_string(),
            (_, None) => "?".to_owned(),
        }
    }
}

impl fmt::Display for JobDocumentation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}
