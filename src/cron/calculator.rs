//! Fire-time calculation over a parsed cron expression.
//!
//! `next_fire` is strictly exclusive (`t > origin`), `prev_fire` is
//! inclusive (`t <= origin`); both land on whole minutes and honor the
//! POSIX DOM/DOW coupling rule. Searches walk candidate months, then the
//! month's valid days, then allowed hours and minutes, so every field is
//! revalidated whenever a higher-order field advances. Candidates that do
//! not exist on the calendar (Feb 30) or on the local clock (a minute
//! erased by a DST transition) are skipped, never errors.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};

use crate::constants::calculator;
use crate::cron::expression::CronExpression;
use crate::errors::HorizonExceededError;

impl CronExpression {
    /// Whether the given wall-clock time is a firing minute.
    ///
    /// Only the minute, hour, day, month and weekday fields participate;
    /// seconds are ignored.
    pub fn matches(&self, at: &DateTime<Local>) -> bool {
        self.minute[at.minute() as usize]
            && self.hour[at.hour() as usize]
            && self.month[at.month() as usize]
            && self.day_part_matches(at.day(), at.weekday().num_days_from_sunday())
    }

    /// The earliest firing time strictly after `origin`, at second zero.
    pub fn next_fire(
        &self,
        origin: &DateTime<Local>,
    ) -> Result<DateTime<Local>, HorizonExceededError> {
        let start = truncate_to_minute(origin.naive_local()) + Duration::minutes(1);
        self.scan_forward(start)
    }

    /// The latest firing time at or before `origin`, at second zero.
    ///
    /// Inclusive on the boundary: an origin that is itself a firing minute
    /// is returned (with its seconds dropped).
    pub fn prev_fire(
        &self,
        origin: &DateTime<Local>,
    ) -> Result<DateTime<Local>, HorizonExceededError> {
        let start = truncate_to_minute(origin.naive_local());
        self.scan_backward(start)
    }

    fn day_part_matches(&self, day: u32, weekday: u32) -> bool {
        let dom = self.day[day as usize];
        let dow = self.weekday[weekday as usize];
        if self.dom_dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Sorted calendar-valid firing days for one month, honoring the
    /// DOM/DOW coupling rule. Served from the bounded cache when possible.
    fn valid_days(&self, year: i32, month: u32) -> Vec<u32> {
        if let Ok(mut cache) = self.day_cache.lock() {
            if let Some(days) = cache.get(&(year, month)) {
                return days.clone();
            }
        }

        let days: Vec<u32> = (1..=31)
            .filter(|&day| match NaiveDate::from_ymd_opt(year, month, day) {
                Some(date) => {
                    self.day_part_matches(day, date.weekday().num_days_from_sunday())
                }
                None => false,
            })
            .collect();

        if let Ok(mut cache) = self.day_cache.lock() {
            cache.put((year, month), days.clone());
        }
        days
    }

    fn scan_forward(&self, start: NaiveDateTime) -> Result<DateTime<Local>, HorizonExceededError> {
        let mut year = start.year();
        let mut month = start.month();

        for _ in 0..calculator::SEARCH_HORIZON_MONTHS {
            if self.month[month as usize] {
                let starting_month = year == start.year() && month == start.month();

                for day in self.valid_days(year, month) {
                    if starting_month && day < start.day() {
                        continue;
                    }
                    let starting_day = starting_month && day == start.day();

                    for hour in 0..self.hour.len() as u32 {
                        if !self.hour[hour as usize] {
                            continue;
                        }
                        if starting_day && hour < start.hour() {
                            continue;
                        }
                        let starting_hour = starting_day && hour == start.hour();

                        for minute in 0..self.minute.len() as u32 {
                            if !self.minute[minute as usize] {
                                continue;
                            }
                            if starting_hour && minute < start.minute() {
                                continue;
                            }
                            if let Some(at) = resolve_local(year, month, day, hour, minute) {
                                return Ok(at);
                            }
                        }
                    }
                }
            }

            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }

        Err(HorizonExceededError {
            expression: self.as_str().to_string(),
        })
    }

    fn scan_backward(&self, start: NaiveDateTime) -> Result<DateTime<Local>, HorizonExceededError> {
        let mut year = start.year();
        let mut month = start.month();

        for _ in 0..calculator::SEARCH_HORIZON_MONTHS {
            if self.month[month as usize] {
                let starting_month = year == start.year() && month == start.month();

                for day in self.valid_days(year, month).into_iter().rev() {
                    if starting_month && day > start.day() {
                        continue;
                    }
                    let starting_day = starting_month && day == start.day();

                    for hour in (0..self.hour.len() as u32).rev() {
                        if !self.hour[hour as usize] {
                            continue;
                        }
                        if starting_day && hour > start.hour() {
                            continue;
                        }
                        let starting_hour = starting_day && hour == start.hour();

                        for minute in (0..self.minute.len() as u32).rev() {
                            if !self.minute[minute as usize] {
                                continue;
                            }
                            if starting_hour && minute > start.minute() {
                                continue;
                            }
                            if let Some(at) = resolve_local(year, month, day, hour, minute) {
                                return Ok(at);
                            }
                        }
                    }
                }
            }

            month -= 1;
            if month == 0 {
                month = 12;
                year -= 1;
            }
        }

        Err(HorizonExceededError {
            expression: self.as_str().to_string(),
        })
    }
}

fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.date()
        .and_hms_opt(at.hour(), at.minute(), 0)
        .unwrap_or(at)
}

/// Resolve a candidate to local time. `None` when the date does not exist
/// on the calendar or the minute does not exist on the local clock; an
/// ambiguous minute (clocks rolled back) resolves to its earlier instant.
fn resolve_local(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Option<DateTime<Local>> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    match naive.and_local_timezone(Local) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .expect("unambiguous local time")
    }

    fn parse(text: &str) -> CronExpression {
        CronExpression::parse(text).expect("valid expression")
    }

    #[test]
    fn matches_checks_every_field() {
        let expr = parse("30 14 * * *");
        assert!(expr.matches(&local(2024, 1, 15, 14, 30, 0)));
        assert!(expr.matches(&local(2024, 1, 15, 14, 30, 59)));
        assert!(!expr.matches(&local(2024, 1, 15, 14, 31, 0)));
        assert!(!expr.matches(&local(2024, 1, 15, 15, 30, 0)));
    }

    #[test]
    fn matches_uses_and_semantics_when_one_day_field_is_wildcard() {
        // 2025-01-06 is a Monday, 2025-01-01 is a Wednesday.
        let dow_only = parse("0 12 * * 1");
        assert!(dow_only.matches(&local(2025, 1, 6, 12, 0, 0)));
        assert!(!dow_only.matches(&local(2025, 1, 1, 12, 0, 0)));

        let dom_only = parse("0 12 1 * *");
        assert!(dom_only.matches(&local(2025, 1, 1, 12, 0, 0)));
        assert!(!dom_only.matches(&local(2025, 1, 6, 12, 0, 0)));
    }

    #[test]
    fn matches_uses_or_semantics_when_both_day_fields_restricted() {
        let expr = parse("0 12 1 * 1");
        // Day-of-month hit on a Wednesday.
        assert!(expr.matches(&local(2025, 1, 1, 12, 0, 0)));
        // Weekday hit on the 6th.
        assert!(expr.matches(&local(2025, 1, 6, 12, 0, 0)));
        // Neither.
        assert!(!expr.matches(&local(2025, 1, 7, 12, 0, 0)));
    }

    #[test]
    fn next_fire_top_of_hour() {
        let expr = parse("0 * * * *");
        let next = expr.next_fire(&local(2024, 1, 1, 14, 30, 0)).unwrap();
        assert_eq!(next, local(2024, 1, 1, 15, 0, 0));
    }

    #[test]
    fn next_fire_rolls_into_next_month() {
        let expr = parse("0 0 1 * *");
        let next = expr.next_fire(&local(2024, 1, 31, 23, 59, 0)).unwrap();
        assert_eq!(next, local(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn next_fire_finds_next_leap_year() {
        let expr = parse("0 0 29 2 *");
        let next = expr.next_fire(&local(2025, 2, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, local(2028, 2, 29, 0, 0, 0));
    }

    #[test]
    fn next_fire_skips_months_without_the_day() {
        let expr = parse("0 0 31 * *");
        let next = expr.next_fire(&local(2025, 4, 1, 0, 0, 0)).unwrap();
        assert_eq!(next, local(2025, 5, 31, 0, 0, 0));
    }

    #[test]
    fn next_fire_dom_or_dow_picks_the_dom_hit() {
        // Both day fields restricted: 2025-01-01 (a Wednesday) fires by
        // day-of-month even though it is not a Monday.
        let expr = parse("0 9 1 * 1");
        let next = expr.next_fire(&local(2025, 1, 1, 8, 59, 0)).unwrap();
        assert_eq!(next, local(2025, 1, 1, 9, 0, 0));
    }

    #[test]
    fn next_fire_is_strictly_exclusive_at_the_boundary() {
        let expr = parse("0 12 * * 0");
        // 2025-01-05 is a Sunday.
        let before = expr.next_fire(&local(2025, 1, 5, 11, 0, 0)).unwrap();
        assert_eq!(before, local(2025, 1, 5, 12, 0, 0));

        let at = expr.next_fire(&local(2025, 1, 5, 12, 0, 0)).unwrap();
        assert_eq!(at, local(2025, 1, 12, 12, 0, 0));
    }

    #[test]
    fn prev_fire_is_inclusive_at_the_boundary() {
        let expr = parse("0 12 * * 0");
        let at = expr.prev_fire(&local(2025, 1, 5, 12, 0, 0)).unwrap();
        assert_eq!(at, local(2025, 1, 5, 12, 0, 0));

        // Seconds are dropped before the comparison.
        let within = expr.prev_fire(&local(2025, 1, 5, 12, 0, 30)).unwrap();
        assert_eq!(within, local(2025, 1, 5, 12, 0, 0));

        let after = expr.prev_fire(&local(2025, 1, 5, 12, 1, 0)).unwrap();
        assert_eq!(after, local(2025, 1, 5, 12, 0, 0));

        let before = expr.prev_fire(&local(2025, 1, 5, 11, 59, 0)).unwrap();
        assert_eq!(before, local(2024, 12, 29, 12, 0, 0));
    }

    #[test]
    fn prev_fire_crosses_year_boundaries() {
        let expr = parse("0 0 29 2 *");
        let prev = expr.prev_fire(&local(2025, 2, 1, 0, 0, 0)).unwrap();
        assert_eq!(prev, local(2024, 2, 29, 0, 0, 0));
    }

    #[test]
    fn minute_lists_wrap_through_the_hour() {
        let expr = parse("0,15,30,45 9-17 * * *");
        let next = expr.next_fire(&local(2024, 6, 3, 17, 45, 0)).unwrap();
        assert_eq!(next, local(2024, 6, 4, 9, 0, 0));

        let within = expr.next_fire(&local(2024, 6, 3, 9, 50, 0)).unwrap();
        assert_eq!(within, local(2024, 6, 3, 10, 0, 0));
    }

    #[test]
    fn impossible_date_exhausts_the_horizon() {
        let expr = parse("0 0 30 2 *");
        let err = expr.next_fire(&local(2024, 1, 1, 0, 0, 0)).unwrap_err();
        assert_eq!(err.expression, "0 0 30 2 *");
        assert!(expr.prev_fire(&local(2024, 1, 1, 0, 0, 0)).is_err());
    }

    #[test]
    fn round_trip_invariants() {
        let expressions = [
            "0 * * * *",
            "* * * * *",
            "0,30 6 * * *",
            "0 0 1 * *",
            "15 9-17 * * 1-5",
            "0 9 1 * 1",
            "0 0 29 2 *",
        ];
        let origins = [
            local(2024, 1, 1, 0, 0, 0),
            local(2024, 2, 29, 12, 34, 56),
            local(2024, 12, 31, 23, 59, 0),
            local(2025, 6, 15, 8, 0, 0),
        ];

        for text in expressions {
            let expr = parse(text);
            for origin in &origins {
                let next = expr.next_fire(origin).unwrap();
                assert!(expr.matches(&next), "{} next {}", text, next);
                assert!(next > *origin, "{} next {} vs {}", text, next, origin);
                assert_eq!(next.second(), 0);

                let prev = expr.prev_fire(origin).unwrap();
                assert!(expr.matches(&prev), "{} prev {}", text, prev);
                assert!(prev <= *origin, "{} prev {} vs {}", text, prev, origin);
                assert_eq!(prev.second(), 0);

                // Stepping back and forward never lands before the origin.
                assert!(expr.next_fire(&prev).unwrap() >= *origin);
            }
        }
    }

    #[test]
    fn repeated_calculations_are_deterministic() {
        // Second pass is served by the day cache; results must not differ.
        let expr = parse("0 9 1 * 1");
        let origin = local(2025, 1, 1, 8, 59, 0);
        let first = expr.next_fire(&origin).unwrap();
        let second = expr.next_fire(&origin).unwrap();
        assert_eq!(first, second);
    }
}
