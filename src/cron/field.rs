//! Single cron field parser.
//!
//! Parses one whitespace-delimited field of a cron expression into a
//! fixed-length boolean mask. The accepted grammar is POSIX-strict: `*`,
//! single integers, inclusive ranges `a-b`, and comma-separated unions of
//! those. Everything else (steps, names, macros, Quartz tokens) is rejected
//! with an error naming the field and the specific violation.

use crate::errors::FieldParseError;

/// Static configuration for one cron field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldSpec {
    pub name: &'static str,
    pub min: u32,
    pub max: u32,
}

pub(crate) const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
pub(crate) const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
pub(crate) const DAY: FieldSpec = FieldSpec { name: "day", min: 1, max: 31 };
pub(crate) const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
pub(crate) const WEEKDAY: FieldSpec = FieldSpec { name: "weekday", min: 0, max: 6 };

/// Parse a field into a mask of length `max + 1`.
///
/// Index `i` in the mask answers "is value `i` permitted". Indices below
/// `min` are always false.
pub(crate) fn parse_field(spec: &FieldSpec, text: &str) -> Result<Vec<bool>, FieldParseError> {
    let mut mask = vec![false; spec.max as usize + 1];

    if text.is_empty() {
        return Err(error(spec, text, "field must not be empty"));
    }

    if text == "*" {
        for value in spec.min..=spec.max {
            mask[value as usize] = true;
        }
        return Ok(mask);
    }

    for part in text.split(',') {
        apply_part(spec, text, part, &mut mask)?;
    }

    // Unreachable under the accepted grammar, but the mask invariant is
    // cheap to enforce here rather than trust downstream.
    if !mask.iter().any(|allowed| *allowed) {
        return Err(error(spec, text, "field permits no values"));
    }

    Ok(mask)
}

fn apply_part(
    spec: &FieldSpec,
    text: &str,
    part: &str,
    mask: &mut [bool],
) -> Result<(), FieldParseError> {
    if part.is_empty() {
        return Err(error(spec, text, "empty list entry"));
    }

    if part.contains('/') {
        return Err(error(
            spec,
            text,
            "step values ('/') are a cron extension and are not supported",
        ));
    }

    if let Some((start_text, end_text)) = part.split_once('-') {
        let start = parse_value(spec, text, start_text)?;
        let end = parse_value(spec, text, end_text)?;
        if start > end {
            return Err(error(
                spec,
                text,
                format!("range start {} is greater than range end {}", start, end),
            ));
        }
        for value in start..=end {
            mask[value as usize] = true;
        }
        return Ok(());
    }

    let value = parse_value(spec, text, part)?;
    mask[value as usize] = true;
    Ok(())
}

fn parse_value(spec: &FieldSpec, text: &str, value_text: &str) -> Result<u32, FieldParseError> {
    if matches!(value_text, "?" | "L" | "W") || value_text.contains('#') {
        return Err(error(
            spec,
            text,
            format!("'{}' is a Quartz extension and is not supported", value_text),
        ));
    }

    if value_text.starts_with('@') {
        return Err(error(
            spec,
            text,
            format!("macros such as '{}' are not supported", value_text),
        ));
    }

    let value: u32 = value_text.parse().map_err(|_| {
        error(
            spec,
            text,
            format!(
                "'{}' is not an unsigned integer (names are not supported)",
                value_text
            ),
        )
    })?;

    if spec.name == WEEKDAY.name && value == 7 {
        return Err(error(spec, text, "Sunday must be 0, not 7"));
    }

    if value < spec.min || value > spec.max {
        return Err(error(
            spec,
            text,
            format!(
                "value {} is outside valid range {}-{}",
                value, spec.min, spec.max
            ),
        ));
    }

    Ok(value)
}

fn error(spec: &FieldSpec, text: &str, reason: impl Into<String>) -> FieldParseError {
    FieldParseError {
        field_name: spec.name,
        field_text: text.to_string(),
        reason: reason.into(),
    }
}
