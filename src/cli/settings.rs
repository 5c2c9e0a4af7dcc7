//! Settings commands

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use clap::Subcommand;

use super::app::Session;
use crate::domain::{parse_weekday, WeekdaySet};
use crate::storage::{parse_time, parse_timezone, ScheduleSettings, SettingsUpdate};

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Show effective settings
    Show {
        /// Show the workspace defaults instead of the project's
        #[arg(long)]
        global: bool,
    },

    /// Change settings
    ///
    /// Task dates are re-derived against the new calendar. The change is
    /// refused if that would move a locked task.
    ///
    /// Examples:
    ///   sm settings set --working-days mon,tue,wed,thu,fri,sat
    ///   sm settings set --global --rollover-time 05:30 --rollover-timezone Australia/Perth
    Set {
        /// Change the workspace defaults instead of the project's
        #[arg(long)]
        global: bool,

        /// Working weekdays, comma separated
        #[arg(long, value_delimiter = ',', value_parser = weekday_arg)]
        working_days: Option<Vec<chrono::Weekday>>,

        /// Add a holiday (repeatable)
        #[arg(long = "add-holiday")]
        add_holidays: Vec<NaiveDate>,

        /// Remove a holiday (repeatable)
        #[arg(long = "remove-holiday")]
        remove_holidays: Vec<NaiveDate>,

        #[arg(long)]
        rollover_enabled: Option<bool>,

        /// Daily sweep time, HH:MM
        #[arg(long, value_parser = time_arg)]
        rollover_time: Option<NaiveTime>,

        /// IANA timezone for the sweep, e.g. Australia/Sydney
        #[arg(long, value_parser = timezone_arg)]
        rollover_timezone: Option<Tz>,
    },
}

fn weekday_arg(s: &str) -> Result<chrono::Weekday, String> {
    parse_weekday(s).ok_or_else(|| format!("unknown weekday '{}'", s))
}

fn time_arg(s: &str) -> Result<NaiveTime, String> {
    parse_time(s).map_err(|e| e.to_string())
}

fn timezone_arg(s: &str) -> Result<Tz, String> {
    parse_timezone(s).map_err(|e| e.to_string())
}

pub fn run(cmd: SettingsCommands, session: &Session) -> Result<()> {
    match cmd {
        SettingsCommands::Show { global } => {
            let project = if global { None } else { Some(session.project()?) };
            let settings = session.engine.get_settings(project.as_ref())?;
            print_settings(session, &settings);
        }
        SettingsCommands::Set {
            global,
            working_days,
            add_holidays,
            remove_holidays,
            rollover_enabled,
            rollover_time,
            rollover_timezone,
        } => {
            let update = SettingsUpdate {
                working_days: working_days.map(WeekdaySet::from_days),
                add_holidays,
                remove_holidays,
                rollover_enabled,
                rollover_time,
                rollover_timezone,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to change. See 'sm settings set --help'.");
            }

            let project = if global { None } else { Some(session.project()?) };
            let settings = session.engine.update_settings(project.as_ref(), &update)?;
            if !session.output.is_json() {
                session.output.success("Settings updated");
            }
            print_settings(session, &settings);
        }
    }

    Ok(())
}

fn print_settings(session: &Session, settings: &ScheduleSettings) {
    if session.output.is_json() {
        session.output.data(settings);
        return;
    }

    let holidays = settings
        .calendar
        .holidays
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>();

    println!("Working days: {}", settings.calendar.working_days);
    if holidays.is_empty() {
        println!("Holidays: none");
    } else {
        println!("Holidays: {}", holidays.join(", "));
    }
    println!(
        "Rollover: {} at {} {}",
        if settings.rollover.enabled { "enabled" } else { "disabled" },
        settings.rollover.time.format("%H:%M"),
        settings.rollover.timezone
    );
}
