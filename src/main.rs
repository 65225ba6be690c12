// ABOUTME: CLI entry point for backup-scheduler
// ABOUTME: Lists, creates and deletes scheduled folder backups with retry prompts on failure

use anyhow::{Context, Result};
use backup_task_scheduler::job::spec::folder_name;
use backup_task_scheduler::job::{hour_label, WEEKDAY_NAMES};
use backup_task_scheduler::registry::is_last_job;
use backup_task_scheduler::script::retention::{scan_rotated, select_for_pruning};
use backup_task_scheduler::{
    render_script, BackupJobSpec, IntervalKind, JobRegistry, PowerShellTaskService,
    RegisteredJob, ScheduleError, Settings,
};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "backup-scheduler")]
#[command(about = "Schedule recurring folder backups with Windows Task Scheduler", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List scheduled backups
    List,
    /// Schedule a recurring backup, replacing any backup of the same folders
    Create(ScheduleArgs),
    /// Delete a scheduled backup by task name
    Delete {
        /// Task name as shown by `list`
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the script a scheduled backup would run
    RenderScript(ScheduleArgs),
    /// Show which rotated backups the next run would delete
    PreviewPrune {
        /// Folder being backed up
        #[arg(long)]
        source: PathBuf,
        /// Folder the backups are stored in
        #[arg(long)]
        dest: PathBuf,
        /// Number of backups to keep
        #[arg(long)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Interval {
    Daily,
    Weekly,
    Monthly,
}

impl From<Interval> for IntervalKind {
    fn from(interval: Interval) -> Self {
        match interval {
            Interval::Daily => IntervalKind::Daily,
            Interval::Weekly => IntervalKind::Weekly,
            Interval::Monthly => IntervalKind::Monthly,
        }
    }
}

#[derive(Args)]
struct ScheduleArgs {
    /// Folder to back up
    #[arg(long)]
    source: PathBuf,
    /// Folder to store backups in
    #[arg(long)]
    dest: PathBuf,
    #[arg(long, value_enum, default_value_t = Interval::Daily)]
    interval: Interval,
    /// Day of week for weekly backups (0 = Sunday)
    #[arg(long, default_value_t = 0)]
    weekday: u8,
    /// Day of month for monthly backups (1-31)
    #[arg(long, default_value_t = 1)]
    day: u8,
    /// Hour of day to run (0-23)
    #[arg(long)]
    hour: u8,
    /// Number of backups to keep (1-10, 0 keeps all)
    #[arg(long, default_value_t = 0)]
    limit: u8,
    /// Overwrite the previous backup instead of keeping dated copies
    #[arg(long)]
    overwrite: bool,
}

impl ScheduleArgs {
    fn to_spec(&self) -> Result<BackupJobSpec> {
        let day_of_month = self
            .day
            .checked_sub(1)
            .context("--day must be between 1 and 31")?;
        Ok(BackupJobSpec {
            source: self.source.clone(),
            destination: self.dest.clone(),
            interval: self.interval.into(),
            day_of_week: self.weekday,
            day_of_month,
            start_hour: self.hour,
            retention_limit: self.limit,
            overwrite: self.overwrite,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::List => {
            let registry = open_registry(&settings)?;
            let jobs = with_retry(|| {
                with_spinner("Fetching scheduled backups", || registry.list_jobs())
            })?;
            print_jobs(&jobs);
        }
        Commands::Create(args) => {
            let spec = args.to_spec()?;
            let registry = open_registry(&settings)?;
            let job = with_retry(|| {
                with_spinner("Scheduling backup", || registry.create_job(&spec))
            })?;
            println!(
                "Scheduled {:?} {}, next run {}",
                job.name,
                describe_schedule(&spec),
                format_time(job.next_run)
            );
        }
        Commands::Delete { name, yes } => {
            let registry = open_registry(&settings)?;
            let jobs = with_retry(|| registry.list_jobs())?;
            if !jobs.iter().any(|job| job.name == name) {
                anyhow::bail!("No scheduled backup named {name:?}");
            }
            if !yes && std::io::stdin().is_terminal() {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Delete scheduled backup {name:?}?"))
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
                if !confirmed {
                    return Ok(());
                }
            }
            let last = is_last_job(&jobs, &name);
            with_retry(|| {
                with_spinner("Deleting scheduled backup", || registry.delete_job(&name, last))
            })?;
            println!("Deleted {name:?}");
        }
        Commands::RenderScript(args) => {
            let spec = args.to_spec()?;
            spec.validate()?;
            let script = render_script(
                &spec,
                &settings.app_title,
                settings.toast_expiration_minutes,
            );
            print!("{}", script.as_str());
        }
        Commands::PreviewPrune {
            source,
            dest,
            limit,
        } => preview_prune(&source, &dest, limit)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_registry(settings: &Settings) -> Result<JobRegistry<PowerShellTaskService>> {
    let service = PowerShellTaskService::discover(settings.powershell.as_deref())
        .context("PowerShell is required to manage scheduled backups")?;
    tracing::debug!(
        interpreter = %service.interpreter().display(),
        folder = %settings.folder,
        "Using task scheduler bridge"
    );
    Ok(JobRegistry::new(service, settings.clone()))
}

/// Runs `op`, offering a retry on failures where one can help. Cancel is
/// the default answer, and without a terminal the error is returned as is.
fn with_retry<T>(mut op: impl FnMut() -> Result<T, ScheduleError>) -> Result<T> {
    loop {
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let prompt = err.kind().prompt();
        tracing::warn!(kind = ?err.kind(), error = %err, "Scheduler operation failed");

        if prompt.retryable && std::io::stdin().is_terminal() {
            let retry = Confirm::new()
                .with_prompt(format!(
                    "{}: {}. Do you want to try again?",
                    prompt.title, prompt.body
                ))
                .default(false)
                .interact()
                .context("Failed to read answer")?;
            if retry {
                continue;
            }
        }
        return Err(anyhow::Error::new(err).context(prompt.body));
    }
}

fn with_spinner<T>(message: &str, op: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_owned());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = op();
    spinner.finish_and_clear();
    result
}

fn describe_schedule(spec: &BackupJobSpec) -> String {
    let at = hour_label(spec.start_hour);
    match spec.interval {
        IntervalKind::Daily => format!("daily at {at}"),
        IntervalKind::Weekly => {
            let day = WEEKDAY_NAMES
                .get(usize::from(spec.day_of_week))
                .copied()
                .unwrap_or("?");
            format!("every {day} at {at}")
        }
        IntervalKind::Monthly => format!("monthly on day {} at {at}", spec.day_of_month + 1),
    }
}

fn format_time(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_owned())
}

fn print_jobs(jobs: &[RegisteredJob]) {
    if jobs.is_empty() {
        println!("No scheduled backups.");
        return;
    }

    println!(
        "{:<32} {:<32} {:<8} {:<16} {:<16} {:<10} {:<6} {:<5} {:<9} NAME",
        "SOURCE",
        "DESTINATION",
        "INTERVAL",
        "NEXT RUN",
        "LAST RUN",
        "RESULT",
        "MISSED",
        "LIMIT",
        "OVERWRITE"
    );
    for job in jobs {
        println!("{}", job_row(job));
    }
}

fn job_row(job: &RegisteredJob) -> String {
    let (source, destination, limit, overwrite) = match job.decode_documentation() {
        Ok(doc) => {
            let overwrite = match doc.overwrite {
                Some(true) => "Yes",
                Some(false) => "No",
                None => "?",
            };
            let limit = doc.limit_label();
            (doc.source, doc.destination, limit, overwrite)
        }
        Err(_) => (job.name.clone(), String::new(), "?".to_owned(), "?"),
    };
    format!(
        "{:<32} {:<32} {:<8} {:<16} {:<16} {:<10} {:<6} {:<5} {:<9} {}",
        source,
        destination,
        job.interval_label(),
        format_time(job.next_run),
        format_time(job.last_run),
        format!("0x{:X}", job.last_result),
        job.missed_runs,
        limit,
        overwrite,
        job.name
    )
}

fn preview_prune(source: &Path, dest: &Path, limit: usize) -> Result<()> {
    let folder = folder_name(source);
    let backups = scan_rotated(dest, &folder)
        .with_context(|| format!("Failed to list backups in {}", dest.display()))?;
    let doomed = select_for_pruning(&backups, limit);

    if doomed.is_empty() {
        println!(
            "Nothing to prune: {} backup(s) of {folder}, keeping {limit}",
            backups.len()
        );
        return Ok(());
    }
    println!(
        "Next run keeps {limit} of {} backup(s) of {folder} and deletes:",
        backups.len()
    );
    for backup in doomed {
        println!(
            "  {}  {}",
            backup.created_local().format("%Y-%m-%d %H:%M:%S"),
            backup.path.display()
        );
    }
    Ok(())
}
