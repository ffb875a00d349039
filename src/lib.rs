//! cronkeep — persistent cron task scheduler.
//!
//! A single-process scheduler built from three pieces: a POSIX-strict cron
//! expression engine (parse, match, next/previous fire), a durable
//! SQLite-backed task store, and a polling loop with downtime catch-up,
//! retry-on-failure and crash recovery of interrupted tasks.

pub mod constants;
pub mod cron;
pub mod errors;
pub mod scheduler;
pub mod store;
pub mod time;

// Re-export commonly used types
pub use cron::CronExpression;
pub use errors::{
    FieldParseError, HorizonExceededError, InvalidCronExpressionError, SchedulerError,
};
pub use scheduler::{CronScheduler, SchedulerOptions, TaskCallback, TaskFuture, TaskRegistration};
pub use store::{TaskRecord, TaskStore};
pub use time::{Clock, Sleeper, SystemClock, TokioSleeper};
