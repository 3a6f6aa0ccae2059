use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};
use crate::types::JobRecord;

/// Parse a `HH:MM` (24-hour) schedule time.
pub fn parse_schedule_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
        SchedulerError::Validation(format!("schedule_time must be HH:MM, got {raw:?}"))
    })
}

/// Parse an IANA timezone name such as `America/Chicago`.
pub fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|_| SchedulerError::Validation(format!("unknown timezone {raw:?}")))
}

/// Whether `job` should run at `now`.
///
/// Due once the job's local time of day has reached `schedule_time`, unless it
/// already ran on the same local calendar day.
pub fn is_due(job: &JobRecord, now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&job.timezone);
    if local.time() < job.schedule_time {
        return false;
    }
    !ran_on(job, local.date_naive())
}

fn ran_on(job: &JobRecord, day: NaiveDate) -> bool {
    job.last_run
        .is_some_and(|last| last.with_timezone(&job.timezone).date_naive() == day)
}

/// The earliest instant at or after `now` at which `job` is due.
pub fn next_run_after(job: &JobRecord, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if is_due(job, now) {
        return Some(now);
    }
    let local = now.with_timezone(&job.timezone);
    let today = local.date_naive();
    let day = if !ran_on(job, today) && local.time() < job.schedule_time {
        today
    } else {
        today.succ_opt()?
    };
    local_instant(job.timezone, day, job.schedule_time)
}

/// `day` at `time` in `tz`, as UTC.
///
/// An ambiguous local time (clocks falling back) resolves to the first
/// occurrence. A local time skipped by a DST gap resolves to the first minute
/// after the gap, which is when the local clock first passes `time`.
fn local_instant(tz: Tz, day: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = day.and_time(time);
    (0..=180)
        .find_map(|m| {
            tz.from_local_datetime(&(naive + Duration::minutes(m)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn job(time: &str, tz: Tz) -> JobRecord {
        JobRecord::new(
            "realm",
            "ops@example.com",
            parse_schedule_time(time).unwrap(),
            tz,
            at(2025, 1, 1, 0, 0),
        )
    }

    #[test]
    fn parse_rejects_bad_times() {
        assert_eq!(
            parse_schedule_time("09:05").unwrap(),
            NaiveTime::from_hms_opt(9, 5, 0).unwrap()
        );
        for bad in ["", "9", "25:00", "09:60", "nine", "09:00:00"] {
            assert!(parse_schedule_time(bad).is_err(), "{bad:?}");
        }
        assert!(parse_timezone("Europe/Berlin").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn nine_am_daily_cycle() {
        let mut j = job("09:00", chrono_tz::UTC);
        assert!(!is_due(&j, at(2025, 3, 1, 8, 59)));
        assert!(is_due(&j, at(2025, 3, 1, 9, 5)));

        j.last_run = Some(at(2025, 3, 1, 9, 5));
        assert!(!is_due(&j, at(2025, 3, 1, 9, 10)));
        assert!(!is_due(&j, at(2025, 3, 1, 23, 59)));
        assert!(!is_due(&j, at(2025, 3, 2, 8, 0)));
        assert!(is_due(&j, at(2025, 3, 2, 9, 5)));
    }

    #[test]
    fn calendar_day_follows_job_timezone() {
        // 09:00 in Los Angeles is 17:00 UTC (PST, UTC-8).
        let mut j = job("09:00", chrono_tz::America::Los_Angeles);
        assert!(!is_due(&j, at(2025, 3, 1, 16, 59)));
        assert!(is_due(&j, at(2025, 3, 1, 17, 0)));

        // Ran at 17:30 UTC; 07:00 UTC the next day is still 23:00 on the
        // same local day.
        j.last_run = Some(at(2025, 3, 1, 17, 30));
        assert!(!is_due(&j, at(2025, 3, 2, 7, 0)));
        assert!(is_due(&j, at(2025, 3, 2, 17, 0)));
    }

    #[test]
    fn next_run_is_today_or_tomorrow() {
        let mut j = job("09:00", chrono_tz::UTC);
        assert_eq!(next_run_after(&j, at(2025, 3, 1, 8, 0)), Some(at(2025, 3, 1, 9, 0)));
        assert_eq!(next_run_after(&j, at(2025, 3, 1, 9, 30)), Some(at(2025, 3, 1, 9, 30)));

        j.last_run = Some(at(2025, 3, 1, 9, 30));
        assert_eq!(next_run_after(&j, at(2025, 3, 1, 10, 0)), Some(at(2025, 3, 2, 9, 0)));

        // Ran early via "run now": nothing more today.
        j.last_run = Some(at(2025, 3, 1, 7, 0));
        assert_eq!(next_run_after(&j, at(2025, 3, 1, 8, 0)), Some(at(2025, 3, 2, 9, 0)));
    }

    #[test]
    fn next_run_skips_dst_gap() {
        // 2025-03-09 02:30 does not exist in New York; clocks jump to 03:00 EDT.
        let mut j = job("02:30", chrono_tz::America::New_York);
        j.last_run = Some(at(2025, 3, 8, 8, 0));
        let next = next_run_after(&j, at(2025, 3, 8, 12, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 9, 7, 0));
        assert!(is_due(&j, next));
    }
}
