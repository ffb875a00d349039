//! Minimum fire-interval estimation.
//!
//! The scheduler polls on a fixed cadence and misses anything denser, so
//! registrations are rejected when an expression can fire more often than
//! the loop wakes up. The estimate is conservative: it probes consecutive
//! fire times from several seeds and keeps the smallest positive delta.

use chrono::{DateTime, Duration, Local};

use crate::constants::calculator;
use crate::cron::expression::CronExpression;
use crate::errors::SchedulerError;

/// Smallest observed interval between two consecutive fires.
///
/// Probes from `now`, one minute, one hour and one day ahead, chaining
/// `next_fire` up to [`calculator::FREQUENCY_PROBE_STEPS`] times per seed.
/// Stops early once a sub-minute delta appears (nothing fires denser than
/// once a minute). An expression with no fire inside the search horizon is
/// treated as firing once a year, which is permissive on purpose.
pub fn minimum_fire_interval(expr: &CronExpression, now: DateTime<Local>) -> Duration {
    let seeds = [
        now,
        now + Duration::minutes(1),
        now + Duration::hours(1),
        now + Duration::days(1),
    ];

    let mut minimum: Option<Duration> = None;

    'seeds: for seed in seeds {
        let mut cursor = seed;
        let mut previous: Option<DateTime<Local>> = None;

        for _ in 0..calculator::FREQUENCY_PROBE_STEPS {
            let next = match expr.next_fire(&cursor) {
                Ok(at) => at,
                // Nothing left to fire from this seed; the other seeds
                // may still observe a delta.
                Err(_) => continue 'seeds,
            };

            if let Some(previous) = previous {
                let delta = next - previous;
                if delta > Duration::zero() && minimum.map_or(true, |current| delta < current) {
                    minimum = Some(delta);
                }
                if delta < Duration::minutes(1) {
                    break 'seeds;
                }
            }

            previous = Some(next);
            cursor = next;
        }
    }

    minimum.unwrap_or_else(|| Duration::days(365))
}

/// Reject `expr` when it fires more often than `poll_interval`.
pub fn validate_frequency(
    expr: &CronExpression,
    poll_interval: std::time::Duration,
    now: DateTime<Local>,
) -> Result<(), SchedulerError> {
    let task_frequency = minimum_fire_interval(expr, now);
    let task_frequency_ms = task_frequency.num_milliseconds();
    let poll_frequency_ms = poll_interval.as_millis() as i64;

    if task_frequency_ms < poll_frequency_ms {
        return Err(SchedulerError::ScheduleFrequency {
            task_frequency_ms,
            poll_frequency_ms,
        });
    }

    Ok(())
}
