//! Custom error types for the scheduler
//!
//! Provides structured error handling with context for parse failures,
//! registration problems, and calculator limits.

use std::fmt;

/// A single cron field failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParseError {
    /// Which field was being parsed (minute, hour, day, month, weekday)
    pub field_name: &'static str,

    /// The offending field text, verbatim
    pub field_text: String,

    /// What rule the text violated
    pub reason: String,
}

/// A cron expression failed to parse as a whole.
///
/// Wraps a [`FieldParseError`] with the full expression text, or reports a
/// structural problem (wrong field count) with no field attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCronExpressionError {
    /// The full expression text, verbatim
    pub expression: String,

    /// The field that failed, when a single field is to blame
    pub field: Option<&'static str>,

    /// What rule the expression violated
    pub reason: String,
}

/// The fire-time calculator exhausted its search horizon.
///
/// This indicates a logic bug in the calculator, never an external failure:
/// every expression accepted by the parser fires within the horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonExceededError {
    /// The expression whose search ran off the horizon
    pub expression: String,
}

/// Main error type for scheduler registration and operation.
#[derive(Debug)]
pub enum SchedulerError {
    /// A registration carried an unparseable cron expression
    InvalidCronExpression(InvalidCronExpressionError),

    /// An expression fires more often than the scheduler polls
    ScheduleFrequency {
        task_frequency_ms: i64,
        poll_frequency_ms: i64,
    },

    /// A registration entry is structurally invalid
    InvalidRegistration { index: usize, reason: String },

    /// Two registrations share a name
    DuplicateTask { task_name: String },

    /// Fire-time calculation exceeded the search horizon
    HorizonExceeded(HorizonExceededError),

    /// The task store failed during registration
    Store { reason: String },
}

impl fmt::Display for FieldParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid {} field '{}': {}",
            self.field_name, self.field_text, self.reason
        )
    }
}

impl fmt::Display for InvalidCronExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(
                f,
                "Invalid cron expression '{}' ({} field): {}",
                self.expression, field, self.reason
            ),
            None => write!(
                f,
                "Invalid cron expression '{}': {}",
                self.expression, self.reason
            ),
        }
    }
}

impl fmt::Display for HorizonExceededError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No matching time within the 10-year search horizon for '{}'",
            self.expression
        )
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidCronExpression(e) => write!(f, "{}", e),
            SchedulerError::ScheduleFrequency {
                task_frequency_ms,
                poll_frequency_ms,
            } => {
                write!(
                    f,
                    "Task fires every {}ms which is more often than the {}ms poll interval",
                    task_frequency_ms, poll_frequency_ms
                )
            }
            SchedulerError::InvalidRegistration { index, reason } => {
                write!(f, "Registration at index {}: {}", index, reason)
            }
            SchedulerError::DuplicateTask { task_name } => {
                write!(f, "Task with name {} is already scheduled", task_name)
            }
            SchedulerError::HorizonExceeded(e) => write!(f, "{}", e),
            SchedulerError::Store { reason } => {
                write!(f, "Task store error: {}", reason)
            }
        }
    }
}

impl std::error::Error for FieldParseError {}
impl std::error::Error for InvalidCronExpressionError {}
impl std::error::Error for HorizonExceededError {}
impl std::error::Error for SchedulerError {}

impl From<InvalidCronExpressionError> for SchedulerError {
    fn from(err: InvalidCronExpressionError) -> Self {
        SchedulerError::InvalidCronExpression(err)
    }
}

impl From<HorizonExceededError> for SchedulerError {
    fn from(err: HorizonExceededError) -> Self {
        SchedulerError::HorizonExceeded(err)
    }
}
