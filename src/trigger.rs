// ABOUTME: Builds the recurring calendar trigger for a backup job
// ABOUTME: Computes the first run so a job never fires for an hour already past

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Weekday};

use crate::job::spec::{validate_schedule, ParameterError};
use crate::job::IntervalKind;

/// Repetition window applied to every trigger. The scheduler treats the
/// duration literally, so it is set far beyond any realistic lifetime.
pub const REPETITION_WINDOW_DAYS: i64 = 365;

pub const DAILY_INTERVAL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error(transparent)]
    InvalidParameter(#[from] ParameterError),
    #[error("no valid first run time after {0}")]
    Unrepresentable(NaiveDate),
}

impl TriggerError {
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, TriggerError::InvalidParameter(_))
    }
}

/// Calendar cadence of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly(Weekday),
    /// 1-based day of the month. Months without that day are skipped.
    Monthly(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceTrigger {
    pub cadence: Cadence,
    /// Local wall-clock time with no offset, as Task Scheduler expects.
    pub first_run: NaiveDateTime,
    /// Only daily triggers repeat on an explicit interval.
    pub repeat_every: Option<TimeDelta>,
    pub repeat_for: TimeDelta,
}

impl RecurrenceTrigger {
    pub fn kind(&self) -> IntervalKind {
        match self.cadence {
            Cadence::Daily => IntervalKind::Daily,
            Cadence::Weekly(_) => IntervalKind::Weekly,
            Cadence::Monthly(_) => IntervalKind::Monthly,
        }
    }
}

/// Builds a trigger relative to the current local time.
pub fn build_trigger(
    kind: IntervalKind,
    day_of_month: u8,
    day_of_week: u8,
    hour: u8,
) -> Result<RecurrenceTrigger, TriggerError> {
    build_trigger_at(kind, day_of_month, day_of_week, hour, Local::now().naive_local())
}

/// Builds a trigger relative to `now`.
///
/// `day_of_month` is 0-indexed and `day_of_week` counts from Sunday = 0.
/// Both are range-checked for every kind.
pub fn build_trigger_at(
    kind: IntervalKind,
    day_of_month: u8,
    day_of_week: u8,
    hour: u8,
    now: NaiveDateTime,
) -> Result<RecurrenceTrigger, TriggerError> {
    validate_schedule(day_of_month, day_of_week, hour)?;
    let first_run = first_run_after(now, hour)?;
    let repeat_for = TimeDelta::days(REPETITION_WINDOW_DAYS);

    let trigger = match kind {
        IntervalKind::Daily => RecurrenceTrigger {
            cadence: Cadence::Daily,
            first_run,
            repeat_every: Some(TimeDelta::hours(DAILY_INTERVAL_HOURS)),
            repeat_for,
        },
        IntervalKind::Weekly => RecurrenceTrigger {
            cadence: Cadence::Weekly(weekday_from_sunday(day_of_week)),
            first_run,
            repeat_every: None,
            repeat_for,
        },
        IntervalKind::Monthly => RecurrenceTrigger {
            cadence: Cadence::Monthly(day_of_month + 1),
            first_run,
            repeat_every: None,
            repeat_for,
        },
    };
    Ok(trigger)
}

/// Today at `hour` if that hour is still ahead, otherwise tomorrow.
pub fn first_run_after(now: NaiveDateTime, hour: u8) -> Result<NaiveDateTime, TriggerError> {
    let today = now.date();
    let date = if now.hour() < u32::from(hour) {
        today
    } else {
        today
            .succ_opt()
            .ok_or(TriggerError::Unrepresentable(today))?
    };
    date.and_hms_opt(u32::from(hour), 0, 0)
        .ok_or(TriggerError::Unrepresentable(date))
}

fn weekday_from_sunday(day: u8) -> Weekday {
    match day {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}
