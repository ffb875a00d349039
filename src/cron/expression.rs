//! Parsed cron expression value.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::constants::calculator;
use crate::cron::field::{self, DAY, HOUR, MINUTE, MONTH, WEEKDAY};
use crate::errors::InvalidCronExpressionError;

/// An immutable, validated cron expression.
///
/// Only [`CronExpression::parse`] produces values of this type; a value in
/// hand is proof the text passed POSIX-strict validation.
///
/// The five masks answer "is value `i` permitted" per field. Weekday 0 is
/// Sunday. `dom_dow_restricted` records whether **both** the day and weekday
/// fields were non-wildcard in the source text, which switches day matching
/// from AND to OR semantics (POSIX).
pub struct CronExpression {
    text: String,
    pub(crate) minute: Vec<bool>,
    pub(crate) hour: Vec<bool>,
    pub(crate) day: Vec<bool>,
    pub(crate) month: Vec<bool>,
    pub(crate) weekday: Vec<bool>,
    pub(crate) dom_dow_restricted: bool,
    /// Sorted valid days per (year, month) under the current DOM/DOW
    /// semantics. Bounded; correctness never depends on a hit.
    pub(crate) day_cache: Mutex<LruCache<(i32, u32), Vec<u32>>>,
}

impl CronExpression {
    /// Parse a 5-field POSIX cron expression.
    ///
    /// The input is trimmed and split on whitespace; exactly five non-empty
    /// fields are required (`minute hour day month weekday`).
    pub fn parse(text: &str) -> Result<Self, InvalidCronExpressionError> {
        let trimmed = text.trim();
        let fields: Vec<&str> = trimmed.split_whitespace().collect();

        if fields.len() != 5 {
            return Err(InvalidCronExpressionError {
                expression: trimmed.to_string(),
                field: None,
                reason: format!(
                    "expected 5 fields (minute hour day month weekday), got {}",
                    fields.len()
                ),
            });
        }

        let wrap = |err: crate::errors::FieldParseError| InvalidCronExpressionError {
            expression: trimmed.to_string(),
            field: Some(err.field_name),
            reason: err.reason,
        };

        let minute = field::parse_field(&MINUTE, fields[0]).map_err(wrap)?;
        let hour = field::parse_field(&HOUR, fields[1]).map_err(wrap)?;
        let day = field::parse_field(&DAY, fields[2]).map_err(wrap)?;
        let month = field::parse_field(&MONTH, fields[3]).map_err(wrap)?;
        let weekday = field::parse_field(&WEEKDAY, fields[4]).map_err(wrap)?;

        let dom_dow_restricted = fields[2] != "*" && fields[4] != "*";

        let capacity = NonZeroUsize::new(calculator::DAY_CACHE_CAPACITY)
            .unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            text: trimmed.to_string(),
            minute,
            hour,
            day,
            month,
            weekday,
            dom_dow_restricted,
            day_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// The expression text as parsed (trimmed).
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Behavioral equality: two expressions with the same masks and the same
/// DOM/DOW coupling fire at exactly the same times, whatever their
/// spelling. The original text and the cache do not participate.
impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.minute == other.minute
            && self.hour == other.hour
            && self.day == other.day
            && self.month == other.month
            && self.weekday == other.weekday
            && self.dom_dow_restricted == other.dom_dow_restricted
    }
}

impl Eq for CronExpression {}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl fmt::Debug for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronExpression")
            .field("text", &self.text)
            .field("dom_dow_restricted", &self.dom_dow_restricted)
            .finish()
    }
}
