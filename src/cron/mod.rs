//! POSIX cron expression engine.
//!
//! Parsing is split per field (`field`), assembled into an opaque
//! [`CronExpression`] value (`expression`), and evaluated by the fire-time
//! calculator (`calculator`). `frequency` estimates how often an expression
//! can fire, which gates registration against the scheduler's poll interval.

mod calculator;
mod expression;
mod field;
pub mod frequency;

pub use expression::CronExpression;
