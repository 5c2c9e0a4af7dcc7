//! Rollover timer
//!
//! Works out when the daily sweep is due and runs it for every project whose
//! settings enable it. Each project runs at its own time, and "today" is
//! taken in its own timezone.

use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use super::ScheduleEngine;
use crate::domain::{ProjectId, Result, RolloverReport};
use crate::storage::RolloverSettings;

/// The local calendar date at `now` in `tz`
pub fn today_in(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// The first instant strictly after `now` at which the sweep should run, or
/// `None` when rollover is disabled
///
/// A run time that falls in a daylight-saving gap is taken an hour later.
pub fn next_run(settings: &RolloverSettings, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !settings.enabled {
        return None;
    }

    let tz = settings.timezone;
    let mut date = today_in(tz, now);

    // Covers a gap on today plus the roll to tomorrow
    for _ in 0..3 {
        let local = date.and_time(settings.time);
        let at = tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                tz.from_local_datetime(&(local + chrono::Duration::hours(1)))
                    .earliest()
            })
            .map(|t| t.with_timezone(&Utc));

        if let Some(at) = at.filter(|at| *at > now) {
            return Some(at);
        }
        date = date.checked_add_days(Days::new(1))?;
    }

    None
}

/// Drives the sweep for every project on that project's own schedule
pub struct RolloverJob<'a> {
    engine: &'a ScheduleEngine,
}

impl<'a> RolloverJob<'a> {
    pub fn new(engine: &'a ScheduleEngine) -> Self {
        Self { engine }
    }

    /// The next run after `now` of every project with rollover enabled
    pub fn schedule(&self, now: DateTime<Utc>) -> Result<Vec<(ProjectId, DateTime<Utc>)>> {
        let mut runs = Vec::new();

        for project in self.engine.list_projects()? {
            let settings = self.engine.get_settings(Some(&project))?;
            match next_run(&settings.rollover, now) {
                Some(at) => runs.push((project, at)),
                None => debug!(%project, "Rollover disabled"),
            }
        }

        Ok(runs)
    }

    /// When the earliest project is next due
    pub fn next_run(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        Ok(self.schedule(now)?.into_iter().map(|(_, at)| at).min())
    }

    /// Sweeps the projects whose run time fell after `since` and no later
    /// than `now`
    pub fn run_due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Result<RolloverReport> {
        let due = self
            .schedule(since)?
            .into_iter()
            .filter(|(_, at)| *at <= now)
            .map(|(project, _)| project)
            .collect();
        self.sweep(due, now)
    }

    /// Sweeps every enabled project as of `now`, ignoring run times
    pub fn run_all(&self, now: DateTime<Utc>) -> Result<RolloverReport> {
        let enabled = self
            .schedule(now)?
            .into_iter()
            .map(|(project, _)| project)
            .collect();
        self.sweep(enabled, now)
    }

    /// A project that fails is logged and left out; the others still run.
    fn sweep(&self, projects: Vec<ProjectId>, now: DateTime<Utc>) -> Result<RolloverReport> {
        let mut total: Option<RolloverReport> = None;

        for project in projects {
            let settings = self.engine.get_settings(Some(&project))?;
            let today = today_in(settings.rollover.timezone, now);
            match self.engine.run_rollover(&project, today) {
                Ok(report) => match total.as_mut() {
                    Some(t) => t.absorb(report),
                    None => total = Some(report),
                },
                Err(e) => warn!(%project, error = %e, "Rollover failed"),
            }
        }

        let global = self.engine.get_settings(None)?;
        Ok(total.unwrap_or_else(|| RolloverReport::empty(today_in(global.rollover.timezone, now))))
    }

    /// Sleeps until the earliest due project and sweeps whatever is due,
    /// forever or for `max_runs` runs
    ///
    /// Settings are re-read before every wait, so a changed time or
    /// timezone takes effect from the next run.
    pub fn watch(&self, max_runs: Option<usize>) -> Result<()> {
        let mut runs = 0;
        let mut since = Utc::now();

        while max_runs.map_or(true, |max| runs < max) {
            let Some(at) = self.next_run(since)? else {
                info!("Rollover is disabled for every project, nothing to watch");
                return Ok(());
            };

            let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %at, "Waiting for rollover");
            std::thread::sleep(wait);

            let now = Utc::now().max(at);
            let report = self.run_due(since, now)?;
            info!(
                moved = report.moved.len(),
                skipped = report.skipped(),
                "Rollover run complete"
            );
            since = now;
            runs += 1;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, TaskId};
    use crate::storage::{ScheduleSettings, SettingsUpdate};
    use chrono::NaiveTime;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn settings(time: &str, tz: Tz) -> RolloverSettings {
        RolloverSettings {
            enabled: true,
            time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            timezone: tz,
        }
    }

    #[test]
    fn today_depends_on_timezone() {
        let now = utc("2024-01-01T20:00:00Z");
        assert_eq!(today_in(chrono_tz::UTC, now), "2024-01-01".parse::<NaiveDate>().unwrap());
        assert_eq!(
            today_in(chrono_tz::Australia::Sydney, now),
            "2024-01-02".parse::<NaiveDate>().unwrap()
        );
    }

    #[test]
    fn next_run_later_today() {
        let next = next_run(&settings("06:00", chrono_tz::UTC), utc("2024-01-01T05:00:00Z"));
        assert_eq!(next, Some(utc("2024-01-01T06:00:00Z")));
    }

    #[test]
    fn next_run_rolls_to_tomorrow() {
        let next = next_run(&settings("06:00", chrono_tz::UTC), utc("2024-01-01T06:00:00Z"));
        assert_eq!(next, Some(utc("2024-01-02T06:00:00Z")));
    }

    #[test]
    fn next_run_in_local_time() {
        // Sydney is UTC+11 in January
        let next = next_run(
            &settings("00:00", chrono_tz::Australia::Sydney),
            utc("2024-01-01T12:00:00Z"),
        );
        assert_eq!(next, Some(utc("2024-01-01T13:00:00Z")));
    }

    #[test]
    fn next_run_skips_dst_gap() {
        // 02:30 does not exist in New York on 2024-03-10
        let next = next_run(
            &settings("02:30", chrono_tz::America::New_York),
            utc("2024-03-10T05:00:00Z"),
        );
        assert_eq!(next, Some(utc("2024-03-10T07:30:00Z")));
    }

    fn project_with_rollover(
        engine: &ScheduleEngine,
        name: &str,
        time: &str,
        tz: Tz,
    ) -> ProjectId {
        let project: ProjectId = name.parse().unwrap();
        engine.create_project(&project).unwrap();
        let update = SettingsUpdate {
            rollover_enabled: Some(true),
            rollover_time: Some(NaiveTime::parse_from_str(time, "%H:%M").unwrap()),
            rollover_timezone: Some(tz),
            ..Default::default()
        };
        engine.update_settings(Some(&project), &update).unwrap();
        engine
            .add_task(&project, NewTask::new("Slab", "2024-01-01".parse().unwrap(), 1))
            .unwrap();
        project
    }

    fn start_of(engine: &ScheduleEngine, project: &ProjectId) -> NaiveDate {
        engine.get_task(project, TaskId::new(1)).unwrap().task.start_date
    }

    #[test]
    fn projects_run_on_their_own_schedule() {
        let engine = ScheduleEngine::in_memory(ScheduleSettings::default());
        // Sydney midnight is 13:00 UTC the day before in January
        let sydney = project_with_rollover(&engine, "sydney", "00:00", chrono_tz::Australia::Sydney);
        let london = project_with_rollover(&engine, "london", "06:00", chrono_tz::Europe::London);
        let job = RolloverJob::new(&engine);

        let since = utc("2024-01-01T12:00:00Z");
        let mut schedule = job.schedule(since).unwrap();
        schedule.sort();
        assert_eq!(
            schedule,
            vec![
                (london.clone(), utc("2024-01-02T06:00:00Z")),
                (sydney.clone(), utc("2024-01-01T13:00:00Z")),
            ]
        );
        assert_eq!(job.next_run(since).unwrap(), Some(utc("2024-01-01T13:00:00Z")));

        // Only Sydney is due at 13:00 UTC, and it is already the 2nd there
        let first = job.run_due(since, utc("2024-01-01T13:00:00Z")).unwrap();
        assert_eq!(first.moved.len(), 1);
        assert_eq!(start_of(&engine, &sydney), "2024-01-02".parse::<NaiveDate>().unwrap());
        assert_eq!(start_of(&engine, &london), "2024-01-01".parse::<NaiveDate>().unwrap());

        let second = job
            .run_due(utc("2024-01-01T13:00:00Z"), utc("2024-01-02T06:00:00Z"))
            .unwrap();
        assert_eq!(second.moved.len(), 1);
        assert_eq!(start_of(&engine, &london), "2024-01-02".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn project_enabled_under_disabled_workspace_still_runs() {
        let engine = ScheduleEngine::in_memory(ScheduleSettings::default());
        let site = project_with_rollover(&engine, "site", "06:00", chrono_tz::UTC);
        let idle: ProjectId = "idle".parse().unwrap();
        engine.create_project(&idle).unwrap();

        let off = SettingsUpdate {
            rollover_enabled: Some(false),
            ..Default::default()
        };
        engine.update_settings(None, &off).unwrap();

        let job = RolloverJob::new(&engine);
        let now = utc("2024-01-01T05:00:00Z");
        assert_eq!(job.schedule(now).unwrap(), vec![(site, utc("2024-01-01T06:00:00Z"))]);
        assert_eq!(job.next_run(now).unwrap(), Some(utc("2024-01-01T06:00:00Z")));
    }

    #[test]
    fn disabled_has_no_next_run() {
        let mut s = settings("06:00", chrono_tz::UTC);
        s.enabled = false;
        assert_eq!(next_run(&s, utc("2024-01-01T05:00:00Z")), None);
    }
}
