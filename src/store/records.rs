//! Persisted task state records.

use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

/// One task's durable state.
///
/// The cron expression is stored verbatim and re-parsed on load. A record
/// whose `last_attempt_time` is set after the owning process has exited
/// marks an in-flight task: `scheduler_identifier` tells a later instance
/// whether the attempt was its own or belongs to a dead predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub name: String,
    pub cron_expression: String,
    pub retry_delay_ms: i64,
    pub last_success_time: Option<DateTime<Local>>,
    pub last_failure_time: Option<DateTime<Local>>,
    pub last_attempt_time: Option<DateTime<Local>>,
    pub pending_retry_until: Option<DateTime<Local>>,
    pub scheduler_identifier: Option<String>,
}

impl TaskRecord {
    /// A fresh record with empty lifecycle timestamps.
    pub fn new(name: impl Into<String>, cron_expression: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            retry_delay_ms: retry_delay.num_milliseconds(),
            last_success_time: None,
            last_failure_time: None,
            last_attempt_time: None,
            pending_retry_until: None,
            scheduler_identifier: None,
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::milliseconds(self.retry_delay_ms)
    }
}
