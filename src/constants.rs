//! Central repository for scheduling defaults and engine limits.

use std::time::Duration;

/// Polling and retry defaults for the scheduler loop.
pub mod scheduling {
    use super::Duration;

    /// Default cadence at which the scheduler wakes to evaluate tasks.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

    /// Lower bound on the configurable poll interval.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

    /// Default minimum time between a task failure and its retry attempt.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(300);
}

/// Limits for the cron fire-time calculator.
pub mod calculator {
    /// Months scanned before a fire-time search is declared a logic bug.
    /// Ten years plus the partially-scanned starting month.
    pub const SEARCH_HORIZON_MONTHS: u32 = 121;

    /// Bound on the per-(year, month) valid-day cache.
    pub const DAY_CACHE_CAPACITY: usize = 10_000;

    /// Consecutive fire times probed per seed when estimating frequency.
    pub const FREQUENCY_PROBE_STEPS: usize = 10;
}
