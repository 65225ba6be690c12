// ABOUTME: Serializes a TaskDefinition into Task Scheduler 1.2 task XML
// ABOUTME: The XML is what the bridge hands to ITaskFolder::RegisterTask

use chrono::{TimeDelta, Weekday};
use std::fmt::Write;

use super::models::{InstancesPolicy, LogonType, RunLevel, TaskDefinition};
use crate::trigger::{Cadence, RecurrenceTrigger};

const TASK_NAMESPACE: &str = "http://schemas.microsoft.com/windows/2004/02/mit/task";

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// ISO 8601 duration as Task Scheduler spells it (`P365D`, `PT24H`).
pub fn iso_duration(delta: TimeDelta) -> String {
    let secs = delta.num_seconds();
    if secs > 86_400 && secs % 86_400 == 0 {
        format!("P{}D", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("PT{}H", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("PT{}M", secs / 60)
    } else {
        format!("PT{secs}S")
    }
}

fn weekday_element(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn element(out: &mut String, indent: usize, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{:indent$}<{name}>{value}</{name}>", "");
}

fn write_trigger(out: &mut String, trigger: &RecurrenceTrigger) {
    out.push_str("    <CalendarTrigger>\n");
    // Repetition requires an interval, so only daily triggers carry one;
    // weekly and monthly cadence comes from the schedule element.
    if let Some(every) = trigger.repeat_every {
        out.push_str("      <Repetition>\n");
        element(out, 8, "Interval", iso_duration(every));
        element(out, 8, "Duration", iso_duration(trigger.repeat_for));
        element(out, 8, "StopAtDurationEnd", false);
        out.push_str("      </Repetition>\n");
    }
    element(
        out,
        6,
        "StartBoundary",
        trigger.first_run.format("%Y-%m-%dT%H:%M:%S"),
    );
    element(out, 6, "Enabled", true);
    match trigger.cadence {
        Cadence::Daily => {
            out.push_str("      <ScheduleByDay>\n");
            element(out, 8, "DaysInterval", 1);
            out.push_str("      </ScheduleByDay>\n");
        }
        Cadence::Weekly(day) => {
            out.push_str("      <ScheduleByWeek>\n");
            let _ = writeln!(
                out,
                "        <DaysOfWeek><{} /></DaysOfWeek>",
                weekday_element(day)
            );
            element(out, 8, "WeeksInterval", 1);
            out.push_str("      </ScheduleByWeek>\n");
        }
        Cadence::Monthly(day) => {
            out.push_str("      <ScheduleByMonth>\n");
            let _ = writeln!(out, "        <DaysOfMonth><Day>{day}</Day></DaysOfMonth>");
            out.push_str("        <Months>");
            for month in MONTHS {
                let _ = write!(out, "<{month} />");
            }
            out.push_str("</Months>\n");
            out.push_str("      </ScheduleByMonth>\n");
        }
    }
    out.push_str("    </CalendarTrigger>\n");
}

pub fn to_task_xml(definition: &TaskDefinition) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n");
    let _ = writeln!(out, "<Task version=\"1.2\" xmlns=\"{TASK_NAMESPACE}\">");

    let info = &definition.registration;
    out.push_str("  <RegistrationInfo>\n");
    element(&mut out, 4, "Author", escape(&info.author));
    element(&mut out, 4, "Description", escape(&info.description));
    element(&mut out, 4, "Documentation", escape(&info.documentation));
    out.push_str("  </RegistrationInfo>\n");

    out.push_str("  <Triggers>\n");
    for trigger in &definition.triggers {
        write_trigger(&mut out, trigger);
    }
    out.push_str("  </Triggers>\n");

    let principal = &definition.principal;
    out.push_str("  <Principals>\n");
    out.push_str("    <Principal id=\"Author\">\n");
    let logon = match principal.logon_type {
        LogonType::InteractiveToken => "InteractiveToken",
        LogonType::S4U => "S4U",
    };
    let run_level = match principal.run_level {
        RunLevel::Least => "LeastPrivilege",
        RunLevel::Highest => "HighestAvailable",
    };
    element(&mut out, 6, "LogonType", logon);
    element(&mut out, 6, "RunLevel", run_level);
    out.push_str("    </Principal>\n");
    out.push_str("  </Principals>\n");

    let settings = &definition.settings;
    let policy = match settings.multiple_instances {
        InstancesPolicy::Parallel => "Parallel",
        InstancesPolicy::Queue => "Queue",
        InstancesPolicy::IgnoreNew => "IgnoreNew",
        InstancesPolicy::StopExisting => "StopExisting",
    };
    out.push_str("  <Settings>\n");
    element(&mut out, 4, "MultipleInstancesPolicy", policy);
    element(&mut out, 4, "DisallowStartIfOnBatteries", !settings.run_on_battery);
    element(&mut out, 4, "StopIfGoingOnBatteries", !settings.run_on_battery);
    element(&mut out, 4, "AllowHardTerminate", settings.allow_hard_terminate);
    element(&mut out, 4, "AllowStartOnDemand", settings.allow_demand_start);
    element(&mut out, 4, "Enabled", settings.enabled);
    element(&mut out, 4, "WakeToRun", settings.wake_to_run);
    out.push_str("  </Settings>\n");

    out.push_str("  <Actions Context=\"Author\">\n");
    for action in &definition.actions {
        out.push_str("    <Exec>\n");
        element(&mut out, 6, "Command", escape(&action.command));
        element(&mut out, 6, "Arguments", escape(&action.arguments));
        out.push_str("    </Exec>\n");
    }
    out.push_str("  </Actions>\n");
    out.push_str("</Task>\n");
    out
}
