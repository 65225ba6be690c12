// ABOUTME: Task definitions submitted to Task Scheduler and the tasks it reports back
// ABOUTME: RegisteredTask JSON is produced by the PowerShell bridge

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::job::{DocumentationError, IntervalKind, JobDocumentation};
use crate::script::GeneratedScript;
use crate::trigger::RecurrenceTrigger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinition {
    pub registration: RegistrationInfo,
    pub triggers: Vec<RecurrenceTrigger>,
    pub actions: Vec<ExecAction>,
    pub principal: Principal,
    pub settings: TaskSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationInfo {
    pub author: String,
    pub description: String,
    /// Free text the scheduler stores verbatim. Carries [`JobDocumentation`].
    pub documentation: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecAction {
    pub command: String,
    pub arguments: String,
}

impl ExecAction {
    pub fn powershell(interpreter: impl Into<String>, script: &GeneratedScript) -> Self {
        Self {
            command: interpreter.into(),
            arguments: script.launch_arguments(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLevel {
    Least,
    Highest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogonType {
    InteractiveToken,
    /// Service-for-user logon. Runs without a desktop, so PowerShell never
    /// flashes a console window.
    S4U,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub run_level: RunLevel,
    pub logon_type: LogonType,
}

impl Principal {
    pub fn unattended() -> Self {
        Self {
            run_level: RunLevel::Highest,
            logon_type: LogonType::S4U,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancesPolicy {
    Parallel,
    Queue,
    IgnoreNew,
    StopExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    pub allow_demand_start: bool,
    pub allow_hard_terminate: bool,
    pub run_on_battery: bool,
    pub enabled: bool,
    pub wake_to_run: bool,
    pub multiple_instances: InstancesPolicy,
}

impl TaskSettings {
    pub fn unattended() -> Self {
        Self {
            allow_demand_start: true,
            allow_hard_terminate: false,
            run_on_battery: true,
            enabled: true,
            wake_to_run: false,
            // One run per (source, destination) at a time.
            multiple_instances: InstancesPolicy::IgnoreNew,
        }
    }
}

/// `TASK_STATE` as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Unknown,
    Disabled,
    Queued,
    Ready,
    Running,
}

impl From<u8> for TaskState {
    fn from(raw: u8) -> Self {
        match raw {
            1 => TaskState::Disabled,
            2 => TaskState::Queued,
            3 => TaskState::Ready,
            4 => TaskState::Running,
            _ => TaskState::Unknown,
        }
    }
}

/// Snapshot of a task owned by the scheduler service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredJob {
    pub name: String,
    pub path: String,
    pub state: TaskState,
    pub enabled: bool,
    /// Interval of the first trigger, `None` if it is not one we create.
    pub interval: Option<IntervalKind>,
    pub last_run: Option<NaiveDateTime>,
    pub next_run: Option<NaiveDateTime>,
    pub last_result: i32,
    pub missed_runs: u32,
    pub documentation: String,
}

impl RegisteredJob {
    pub fn decode_documentation(&self) -> Result<JobDocumentation, DocumentationError> {
        JobDocumentation::decode(&self.documentation)
    }

    pub fn interval_label(&self) -> String {
        self.interval
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "Unknown".to_owned())
    }
}

/// One task as serialized by the bridge's `ConvertTo-Json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct TaskRecord {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub state: u8,
    #[serde(default)]
    pub enabled: bool,
    pub trigger_type: Option<u8>,
    pub last_run_time: Option<NaiveDateTime>,
    pub next_run_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub last_task_result: i32,
    #[serde(default)]
    pub number_of_missed_runs: u32,
    pub documentation: Option<String>,
}

impl From<TaskRecord> for RegisteredJob {
    fn from(record: TaskRecord) -> Self {
        let interval = match record.trigger_type {
            Some(2) => Some(IntervalKind::Daily),
            Some(3) => Some(IntervalKind::Weekly),
            Some(4) => Some(IntervalKind::Monthly),
            _ => None,
        };
        Self {
            name: record.name,
            path: record.path,
            state: TaskState::from(record.state),
            enabled: record.enabled,
            interval,
            last_run: record.last_run_time,
            next_run: record.next_run_time,
            last_result: record.last_task_result,
            missed_runs: record.number_of_missed_runs,
            documentation: record.documentation.unwrap_or_default(),
        }
    }
}
