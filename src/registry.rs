// ABOUTME: Orchestrates list, create and delete of backup tasks in the scheduler folder
// ABOUTME: Every failure leaves here as a classified ScheduleError

use std::env;
use std::io;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info};

use crate::config::{powershell_under, Settings};
use crate::error::{Classify, ErrorKind, ScheduleError};
use crate::job::{BackupJobSpec, JobDocumentation, JobIdentity};
use crate::scheduler::{
    ExecAction, Principal, RegisteredJob, RegistrationInfo, TaskDefinition, TaskService,
    TaskSession, TaskSettings,
};
use crate::script::render_script;
use crate::trigger::build_trigger;

pub const SYSTEM_DRIVE_VAR: &str = "SYSTEMDRIVE";

/// Session that disconnects when dropped, whichever way the operation exits.
struct Connection<T: TaskSession> {
    session: T,
}

impl<T: TaskSession> Deref for Connection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.session
    }
}

impl<T: TaskSession> DerefMut for Connection<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.session
    }
}

impl<T: TaskSession> Drop for Connection<T> {
    fn drop(&mut self) {
        self.session.disconnect();
    }
}

/// Facade over the scheduler folder that holds this application's jobs.
pub struct JobRegistry<S> {
    service: S,
    settings: Settings,
}

impl<S: TaskService> JobRegistry<S> {
    pub fn new(service: S, settings: Settings) -> Self {
        Self { service, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn connect(&self) -> Result<Connection<S::Session>, ScheduleError> {
        let session = self
            .service
            .connect()
            .classify(ErrorKind::ConnectFailure, "failed to connect to task scheduler")?;
        Ok(Connection { session })
    }

    /// Lists every job in the folder. A folder that does not exist yet
    /// simply means nothing has been scheduled.
    pub fn list_jobs(&self) -> Result<Vec<RegisteredJob>, ScheduleError> {
        let folder = &self.settings.folder;
        let mut conn = self.connect()?;

        if let Err(e) = conn.open_folder(folder) {
            if e.is_not_found() {
                info!(folder = %folder, "Task folder does not exist yet");
                return Ok(Vec::new());
            }
            return Err(ScheduleError::new(
                ErrorKind::RetrieveFolderFailure,
                "failed to find task folder",
                e,
            ));
        }

        let jobs = conn
            .list_tasks(folder)
            .classify(ErrorKind::RetrieveTasksFailure, "failed to retrieve tasks")?;
        debug!(count = jobs.len(), "Listed backup tasks");
        Ok(jobs)
    }

    /// Registers `spec`, replacing any job for the same source and
    /// destination.
    ///
    /// Parameters and directories are checked before the scheduler is
    /// contacted.
    pub fn create_job(&self, spec: &BackupJobSpec) -> Result<RegisteredJob, ScheduleError> {
        spec.validate()
            .classify(ErrorKind::InvalidScheduleParameter, "invalid schedule parameters")?;
        for (label, path) in [("source", &spec.source), ("destination", &spec.destination)] {
            if !path.is_dir() {
                return Err(ScheduleError::new(
                    ErrorKind::DirectoryNotFound,
                    format!("{label} folder {} does not exist", path.display()),
                    io::Error::new(io::ErrorKind::NotFound, path.display().to_string()),
                ));
            }
        }

        let definition = self.build_definition(spec)?;
        let identity = JobIdentity::from_paths(&spec.source, &spec.destination);

        let mut conn = self.connect()?;
        let job = conn
            .register_task(&self.settings.folder, identity.as_str(), &definition)
            .classify(ErrorKind::CreateTaskFailure, "failed to create task")?;
        info!(
            task = %identity,
            interval = %spec.interval,
            hour = spec.start_hour,
            "Registered backup task"
        );
        Ok(job)
    }

    /// Deletes the named job. With `is_last_job` the then-empty folder is
    /// removed too; if it is not actually empty that fails.
    pub fn delete_job(&self, identity: &str, is_last_job: bool) -> Result<(), ScheduleError> {
        let folder = &self.settings.folder;
        let mut conn = self.connect()?;

        conn.delete_task(folder, identity)
            .classify(ErrorKind::DeleteTaskFailure, "failed to delete task")?;
        info!(task = %identity, "Deleted backup task");

        if is_last_job {
            conn.delete_folder(folder)
                .classify(ErrorKind::DeleteFolderFailure, "failed to delete task folder")?;
            info!(folder = %folder, "Deleted empty task folder");
        }
        Ok(())
    }

    /// Assembles the definition submitted for `spec`.
    pub fn build_definition(&self, spec: &BackupJobSpec) -> Result<TaskDefinition, ScheduleError> {
        let trigger = build_trigger(
            spec.interval,
            spec.day_of_month,
            spec.day_of_week,
            spec.start_hour,
        )
        .classify(ErrorKind::CreateTaskFailure, "failed to create trigger")?;

        let system_drive = self
            .system_drive()
            .classify(ErrorKind::CreateTaskFailure, "failed to retrieve systemdrive")?;
        let script = render_script(
            spec,
            &self.settings.app_title,
            self.settings.toast_expiration_minutes,
        );
        let action = ExecAction::powershell(powershell_under(&system_drive), &script);

        Ok(TaskDefinition {
            registration: RegistrationInfo {
                author: self.settings.app_title.clone(),
                description: format!(
                    "Back up {} to {}",
                    spec.source.display(),
                    spec.destination.display()
                ),
                documentation: JobDocumentation::from_spec(spec).encode(),
            },
            triggers: vec![trigger],
            actions: vec![action],
            principal: Principal::unattended(),
            settings: TaskSettings::unattended(),
        })
    }

    fn system_drive(&self) -> Result<String, env::VarError> {
        if let Some(drive) = self.settings.system_drive.as_deref().filter(|d| !d.is_empty()) {
            return Ok(drive.to_owned());
        }
        match env::var(SYSTEM_DRIVE_VAR) {
            Ok(drive) if !drive.is_empty() => Ok(drive),
            Ok(_) => Err(env::VarError::NotPresent),
            Err(e) => Err(e),
        }
    }
}

/// True when `identity` is the only job in `jobs`, meaning deleting it
/// leaves the folder empty.
pub fn is_last_job(jobs: &[RegisteredJob], identity: &str) -> bool {
    matches!(jobs, [only] if only.name == identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::IntervalKind;
    use crate::scheduler::{task_path, ServiceError, TaskState};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeState {
        folders: BTreeMap<String, BTreeMap<String, TaskDefinition>>,
        connects: usize,
        disconnects: usize,
        fail_connect: bool,
        fail_open: bool,
        fail_list: bool,
    }

    #[derive(Clone, Default)]
    struct FakeService(Rc<RefCell<FakeState>>);

    struct FakeSession(Rc<RefCell<FakeState>>);

    impl TaskService for FakeService {
        type Session = FakeSession;

        fn connect(&self) -> Result<FakeSession, ServiceError> {
            let mut state = self.0.borrow_mut();
            if state.fail_connect {
                return Err(ServiceError::Unavailable("rpc server unavailable".to_owned()));
            }
            state.connects += 1;
            Ok(FakeSession(Rc::clone(&self.0)))
        }
    }

    fn registered(folder: &str, name: &str, definition: &TaskDefinition) -> RegisteredJob {
        let trigger = definition.triggers.first();
        RegisteredJob {
            name: name.to_owned(),
            path: task_path(folder, name),
            state: TaskState::Ready,
            enabled: true,
            interval: trigger.map(|t| t.kind()),
            last_run: None,
            next_run: trigger.map(|t| t.first_run),
            last_result: 0,
            missed_runs: 0,
            documentation: definition.registration.documentation.clone(),
        }
    }

    impl TaskSession for FakeSession {
        fn open_folder(&mut self, path: &str) -> Result<(), ServiceError> {
            let state = self.0.borrow();
            if state.fail_open {
                return Err(ServiceError::CallFailed {
                    code: Some(1),
                    message: "access denied".to_owned(),
                });
            }
            if state.folders.contains_key(path) {
                Ok(())
            } else {
                Err(ServiceError::NotFound(path.to_owned()))
            }
        }

        fn list_tasks(&mut self, folder: &str) -> Result<Vec<RegisteredJob>, ServiceError> {
            let state = self.0.borrow();
            if state.fail_list {
                return Err(ServiceError::Decode(
                    serde_json::from_str::<serde_json::Value>("not json").unwrap_err(),
                ));
            }
            let tasks = state
                .folders
                .get(folder)
                .ok_or_else(|| ServiceError::NotFound(folder.to_owned()))?;
            Ok(tasks
                .iter()
                .map(|(name, definition)| registered(folder, name, definition))
                .collect())
        }

        fn register_task(
            &mut self,
            folder: &str,
            name: &str,
            definition: &TaskDefinition,
        ) -> Result<RegisteredJob, ServiceError> {
            self.0
                .borrow_mut()
                .folders
                .entry(folder.to_owned())
                .or_default()
                .insert(name.to_owned(), definition.clone());
            Ok(registered(folder, name, definition))
        }

        fn delete_task(&mut self, folder: &str, name: &str) -> Result<(), ServiceError> {
            self.0
                .borrow_mut()
                .folders
                .get_mut(folder)
                .and_then(|tasks| tasks.remove(name))
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound(name.to_owned()))
        }

        fn delete_folder(&mut self, path: &str) -> Result<(), ServiceError> {
            let mut state = self.0.borrow_mut();
            match state.folders.get(path) {
                None => Err(ServiceError::NotFound(path.to_owned())),
                Some(tasks) if !tasks.is_empty() => Err(ServiceError::CallFailed {
                    code: Some(1),
                    message: "folder is not empty".to_owned(),
                }),
                Some(_) => {
                    state.folders.remove(path);
                    Ok(())
                }
            }
        }

        fn disconnect(&mut self) {
            self.0.borrow_mut().disconnects += 1;
        }
    }

    fn registry() -> (JobRegistry<FakeService>, FakeService) {
        let service = FakeService::default();
        let settings = Settings {
            system_drive: Some("C:".to_owned()),
            ..Settings::default()
        };
        (JobRegistry::new(service.clone(), settings), service)
    }

    fn job(name: &str) -> RegisteredJob {
        RegisteredJob {
            name: name.to_owned(),
            path: format!(r"\GoBackup\{name}"),
            state: TaskState::Ready,
            enabled: true,
            interval: None,
            last_run: None,
            next_run: None,
            last_result: 0,
            missed_runs: 0,
            documentation: String::new(),
        }
    }

    #[test]
    fn test_is_last_job() {
        assert!(is_last_job(&[job("a b")], "a b"));
        assert!(!is_last_job(&[job("a b"), job("c d")], "a b"));
        assert!(!is_last_job(&[job("c d")], "a b"));
        assert!(!is_last_job(&[], "a b"));
    }

    #[test]
    fn test_create_then_list_round_trips_paths() {
        let (registry, service) = registry();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let spec = BackupJobSpec::daily(src.path(), dst.path(), 18).with_retention_limit(3);

        let created = registry.create_job(&spec).unwrap();
        let identity = JobIdentity::from_paths(src.path(), dst.path());
        assert_eq!(created.name, identity.as_str());

        let jobs = registry.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interval, Some(IntervalKind::Daily));
        let doc = jobs[0].decode_documentation().unwrap();
        assert_eq!(doc.source, src.path().to_string_lossy());
        assert_eq!(doc.destination, dst.path().to_string_lossy());
        assert_eq!(doc.retention_limit, Some(3));
        assert_eq!(doc.overwrite, Some(false));

        let state = service.0.borrow();
        assert_eq!(state.connects, 2);
        assert_eq!(state.disconnects, 2);
    }

    #[test]
    fn test_create_same_paths_replaces_job() {
        let (registry, _service) = registry();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        registry
            .create_job(&BackupJobSpec::daily(src.path(), dst.path(), 2))
            .unwrap();
        registry
            .create_job(&BackupJobSpec::weekly(src.path(), dst.path(), 5, 2))
            .unwrap();

        let jobs = registry.list_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].interval, Some(IntervalKind::Weekly));
    }

    #[test]
    fn test_missing_source_never_contacts_scheduler() {
        let (registry, service) = registry();
        let dst = TempDir::new().unwrap();
        let spec = BackupJobSpec::daily(dst.path().join("missing"), dst.path(), 18);

        let err = registry.create_job(&spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotFound);
        assert!(!err.is_retryable());
        assert_eq!(service.0.borrow().connects, 0);
    }

    #[test]
    fn test_invalid_parameters_checked_first() {
        let (registry, service) = registry();
        let spec = BackupJobSpec::daily("/no/such/source", "/no/such/dest", 24);

        let err = registry.create_job(&spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScheduleParameter);

        let spec = BackupJobSpec::daily("/no/such/source", "/no/such/dest", 1)
            .with_retention_limit(11);
        let err = registry.create_job(&spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScheduleParameter);
        assert_eq!(service.0.borrow().connects, 0);
    }

    #[test]
    fn test_list_without_folder_is_empty() {
        let (registry, service) = registry();
        assert!(registry.list_jobs().unwrap().is_empty());
        assert_eq!(service.0.borrow().disconnects, 1);
    }

    #[test]
    fn test_connect_failure_is_classified() {
        let (registry, service) = registry();
        service.0.borrow_mut().fail_connect = true;

        let err = registry.list_jobs().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectFailure);
        assert!(err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_folder_failure_still_disconnects() {
        let (registry, service) = registry();
        service.0.borrow_mut().fail_open = true;

        let err = registry.list_jobs().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetrieveFolderFailure);
        let state = service.0.borrow();
        assert_eq!(state.connects, 1);
        assert_eq!(state.disconnects, 1);
    }

    #[test]
    fn test_listing_failure_after_folder_opens() {
        let (registry, service) = registry();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        registry
            .create_job(&BackupJobSpec::daily(src.path(), dst.path(), 6))
            .unwrap();
        service.0.borrow_mut().fail_list = true;

        let err = registry.list_jobs().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetrieveTasksFailure);
        assert!(err.is_retryable());
        let state = service.0.borrow();
        assert_eq!(state.connects, state.disconnects);
    }

    #[test]
    fn test_delete_last_job_removes_folder() {
        let (registry, service) = registry();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let job = registry
            .create_job(&BackupJobSpec::monthly(src.path(), dst.path(), 0, 3))
            .unwrap();

        let jobs = registry.list_jobs().unwrap();
        registry
            .delete_job(&job.name, is_last_job(&jobs, &job.name))
            .unwrap();

        assert!(service.0.borrow().folders.is_empty());
        assert!(registry.list_jobs().unwrap().is_empty());
    }

    #[test]
    fn test_delete_folder_with_remaining_jobs_fails() {
        let (registry, service) = registry();
        let src = TempDir::new().unwrap();
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let job = registry
            .create_job(&BackupJobSpec::daily(src.path(), first.path(), 1))
            .unwrap();
        registry
            .create_job(&BackupJobSpec::daily(src.path(), second.path(), 1))
            .unwrap();

        let err = registry.delete_job(&job.name, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeleteFolderFailure);
        assert_eq!(registry.list_jobs().unwrap().len(), 1);

        let state = service.0.borrow();
        assert_eq!(state.connects, state.disconnects);
    }

    #[test]
    fn test_delete_unknown_job() {
        let (registry, _service) = registry();
        let err = registry.delete_job("nothing here", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeleteTaskFailure);
    }

    #[test]
    fn test_definition_runs_hidden_powershell() {
        let (registry, _service) = registry();
        let spec = BackupJobSpec::daily(r"C:\Users\Bob\Documents", r"E:\Backups", 22)
            .with_overwrite(true);

        let definition = registry.build_definition(&spec).unwrap();
        let action = &definition.actions[0];
        assert_eq!(
            action.command,
            r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe"
        );
        assert!(action.arguments.contains("-WindowStyle Hidden"));
        assert!(action.arguments.contains("-EncodedCommand"));
        assert_eq!(
            definition.registration.documentation,
            r"C:\Users\Bob\Documents|E:\Backups|-|Yes"
        );
        assert_eq!(definition.registration.author, "GoBackup");
        assert_eq!(definition.triggers.len(), 1);
        assert_eq!(definition.triggers[0].kind(), IntervalKind::Daily);
        assert_eq!(definition.principal, Principal::unattended());
        assert_eq!(definition.settings, TaskSettings::unattended());
    }

    #[test]
    fn test_missing_system_drive_fails_before_connecting() {
        if env::var(SYSTEM_DRIVE_VAR).map_or(false, |d| !d.is_empty()) {
            return;
        }
        let service = FakeService::default();
        let registry = JobRegistry::new(service.clone(), Settings::default());
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let err = registry
            .create_job(&BackupJobSpec::daily(src.path(), dst.path(), 4))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CreateTaskFailure);
        assert_eq!(service.0.borrow().connects, 0);
    }
}
