// ABOUTME: Task Scheduler client driving the Schedule.Service COM object through PowerShell
// ABOUTME: Each call runs a short bridge script and reads JSON back from stdout

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

use super::models::{RegisteredJob, TaskDefinition, TaskRecord};
use super::xml::to_task_xml;
use super::{ServiceError, TaskService, TaskSession};
use crate::script::powershell::quote;

/// Bridge exit codes.
const EXIT_OK: i32 = 0;
const EXIT_CONNECT: i32 = 2;
const EXIT_NOT_FOUND: i32 = 3;

const TASK_CREATE_OR_UPDATE: u32 = 6;
const TASK_LOGON_S4U: u32 = 2;
const TASK_ENUM_HIDDEN: u32 = 1;

/// Connects, defines helpers and exits with [`EXIT_CONNECT`] if the
/// service cannot be reached. HRESULTs -2147024894/-2147024893 are
/// ERROR_FILE_NOT_FOUND and ERROR_PATH_NOT_FOUND. COM failures arrive
/// wrapped in a MethodInvocationException, so `Test-NotFound` reads the
/// inner and base exceptions.
const PROLOGUE: &str = r#"$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
function Fail($code, $err) {
    [Console]::Error.WriteLine($err.Exception.Message)
    exit $code
}
function Test-NotFound($err) {
    $ex = $err.Exception
    foreach ($e in @($ex.InnerException, $ex.GetBaseException(), $ex)) {
        if ($e -and ($e.HResult -eq -2147024894 -or $e.HResult -eq -2147024893)) { return $true }
    }
    return $false
}
function Fail-Lookup($err) {
    if (Test-NotFound $err) { Fail 3 $err }
    Fail 1 $err
}
function Format-Time($t) {
    if ($t.Year -lt 1900) { return $null }
    return $t.ToString('yyyy-MM-ddTHH:mm:ss', [Globalization.CultureInfo]::InvariantCulture)
}
function Write-Tasks($tasks) {
    $records = @()
    foreach ($task in $tasks) {
        $triggerType = $null
        foreach ($trigger in $task.Definition.Triggers) { $triggerType = [int]$trigger.Type; break }
        $records += [pscustomobject]@{
            Name = $task.Name
            Path = $task.Path
            State = [int]$task.State
            Enabled = [bool]$task.Enabled
            TriggerType = $triggerType
            LastRunTime = Format-Time $task.LastRunTime
            NextRunTime = Format-Time $task.NextRunTime
            LastTaskResult = [int]$task.LastTaskResult
            NumberOfMissedRuns = [int]$task.NumberOfMissedRuns
            Documentation = $task.Definition.RegistrationInfo.Documentation
        }
    }
    ConvertTo-Json -InputObject $records -Depth 3 -Compress
}
try {
    $service = New-Object -ComObject Schedule.Service
    $service.Connect()
} catch { Fail 2 $_ }
"#;

/// Production [`TaskService`] backed by `powershell.exe`.
#[derive(Debug, Clone)]
pub struct PowerShellTaskService {
    interpreter: PathBuf,
}

impl PowerShellTaskService {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Uses `explicit` when given, otherwise looks up `powershell` and then
    /// `pwsh` on `PATH`.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ServiceError> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self::new(path));
            }
            return Err(ServiceError::Unavailable(format!(
                "configured PowerShell {} does not exist",
                path.display()
            )));
        }
        which::which("powershell")
            .or_else(|_| which::which("pwsh"))
            .map(Self::new)
            .map_err(|e| ServiceError::Unavailable(format!("PowerShell not found on PATH: {e}")))
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}

impl TaskService for PowerShellTaskService {
    type Session = PowerShellSession;

    fn connect(&self) -> Result<PowerShellSession, ServiceError> {
        let mut session = PowerShellSession {
            interpreter: self.interpreter.clone(),
            open: true,
        };
        session.run("connect", "")?;
        info!(interpreter = %self.interpreter.display(), "Connected to task scheduler");
        Ok(session)
    }
}

/// Session over the bridge. Every call reconnects inside its own
/// PowerShell process; the COM connection dies with that process.
#[derive(Debug)]
pub struct PowerShellSession {
    interpreter: PathBuf,
    open: bool,
}

impl PowerShellSession {
    fn run(&mut self, operation: &str, body: &str) -> Result<String, ServiceError> {
        if !self.open {
            return Err(ServiceError::Unavailable("session already disconnected".to_owned()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("backup-scheduler-")
            .suffix(".ps1")
            .tempfile()?;
        // Windows PowerShell reads BOM-less scripts in the ANSI code page.
        file.write_all("\u{feff}".as_bytes())?;
        file.write_all(bridge_script(body).as_bytes())?;
        file.flush()?;

        debug!(operation, script = %file.path().display(), "Running scheduler bridge");
        let output = Command::new(&self.interpreter)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-File",
            ])
            .arg(file.path())
            .output()?;

        interpret_output(output)
    }
}

impl TaskSession for PowerShellSession {
    fn open_folder(&mut self, path: &str) -> Result<(), ServiceError> {
        let body = format!("try {{ $null = $service.GetFolder({}) }} catch {{ Fail-Lookup $_ }}\n", quote(path));
        self.run("open_folder", &body).map(|_| ())
    }

    fn list_tasks(&mut self, folder: &str) -> Result<Vec<RegisteredJob>, ServiceError> {
        let body = format!(
            "try {{ $folder = $service.GetFolder({}) }} catch {{ Fail-Lookup $_ }}\n\
             Write-Tasks $folder.GetTasks({TASK_ENUM_HIDDEN})\n",
            quote(folder)
        );
        let stdout = self.run("list_tasks", &body)?;
        parse_tasks(&stdout)
    }

    fn register_task(
        &mut self,
        folder: &str,
        name: &str,
        definition: &TaskDefinition,
    ) -> Result<RegisteredJob, ServiceError> {
        let body = register_body(folder, name, &to_task_xml(definition));
        let stdout = self.run("register_task", &body)?;
        parse_tasks(&stdout)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::CallFailed {
                code: Some(EXIT_OK),
                message: format!("service returned no task after registering {name}"),
            })
    }

    fn delete_task(&mut self, folder: &str, name: &str) -> Result<(), ServiceError> {
        let body = format!(
            "try {{ $folder = $service.GetFolder({}) }} catch {{ Fail-Lookup $_ }}\n\
             try {{ $folder.DeleteTask({}, 0) }} catch {{ Fail-Lookup $_ }}\n",
            quote(folder),
            quote(name)
        );
        self.run("delete_task", &body).map(|_| ())
    }

    fn delete_folder(&mut self, path: &str) -> Result<(), ServiceError> {
        let body = format!(
            "try {{ $service.GetFolder('\\').DeleteFolder({}, 0) }} catch {{ Fail-Lookup $_ }}\n",
            quote(path)
        );
        self.run("delete_folder", &body).map(|_| ())
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            debug!("Disconnected from task scheduler");
        }
    }
}

fn bridge_script(body: &str) -> String {
    format!("{PROLOGUE}{body}exit {EXIT_OK}\n")
}

/// Opens `folder`, creating it when it does not exist yet, then creates or
/// replaces the task.
fn register_body(folder: &str, name: &str, xml: &str) -> String {
    format!(
        r#"try {{ $folder = $service.GetFolder({folder}) }} catch {{
    if (-not (Test-NotFound $_)) {{ Fail 1 $_ }}
    try {{ $folder = $service.GetFolder('\').CreateFolder({folder}) }} catch {{ Fail 1 $_ }}
}}
try {{ $task = $folder.RegisterTask({name}, {xml}, {TASK_CREATE_OR_UPDATE}, $null, $null, {TASK_LOGON_S4U}) }} catch {{ Fail 1 $_ }}
Write-Tasks @($task)
"#,
        folder = quote(folder),
        name = quote(name),
        xml = quote(xml),
    )
}

fn interpret_output(output: Output) -> Result<String, ServiceError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    match output.status.code() {
        Some(EXIT_OK) => Ok(stdout),
        Some(EXIT_CONNECT) => Err(ServiceError::Unavailable(stderr)),
        Some(EXIT_NOT_FOUND) => Err(ServiceError::NotFound(stderr)),
        code => Err(ServiceError::CallFailed {
            code,
            message: stderr,
        }),
    }
}

fn parse_tasks(stdout: &str) -> Result<Vec<RegisteredJob>, ServiceError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<TaskRecord> = serde_json::from_str(trimmed)?;
    Ok(records.into_iter().map(RegisteredJob::from).collect())
}
