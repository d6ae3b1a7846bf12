//! Due-date computation for stages and decrees.
//!
//! A caller either supplies an absolute deadline ("es a mi criterio" — at
//! the Minister's discretion) or a number of hours from now. Absent both,
//! the default is 48 hours.

use crate::error::WorkflowError;
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_DEADLINE_HOURS: i64 = 48;

/// Caller-supplied deadline inputs, both optional.
#[derive(Clone, Debug, Default)]
pub struct DeadlineSpec {
    /// Absolute deadline, RFC 3339. Wins over `hours_from_now` when present.
    pub custom_deadline: Option<String>,
    /// Offset in whole hours from `now`, minimum 1.
    pub hours_from_now: Option<i64>,
}

impl DeadlineSpec {
    pub fn is_empty(&self) -> bool {
        self.custom_deadline.is_none() && self.hours_from_now.is_none()
    }
}

/// Compute the due timestamp for `spec` as of `now`.
///
/// A present custom deadline is returned verbatim — timezone correctness is
/// the caller's responsibility, no normalization happens here.
pub fn compute(spec: &DeadlineSpec, now: DateTime<Utc>) -> Result<DateTime<Utc>, WorkflowError> {
    if let Some(raw) = &spec.custom_deadline {
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|e| {
            WorkflowError::InvalidDeadline {
                reason: format!("unparseable custom deadline {raw:?}: {e}"),
            }
        })?;
        return Ok(parsed.with_timezone(&Utc));
    }

    let hours = spec.hours_from_now.unwrap_or(DEFAULT_DEADLINE_HOURS);
    if hours < 1 {
        return Err(WorkflowError::InvalidDeadline {
            reason: format!("hours_from_now must be >= 1, got {hours}"),
        });
    }
    // Wire input: both the duration construction and the addition can
    // overflow, and neither may panic.
    let offset = Duration::try_hours(hours).ok_or_else(|| WorkflowError::InvalidDeadline {
        reason: format!("hours_from_now {hours} is out of range"),
    })?;
    now.checked_add_signed(offset)
        .ok_or_else(|| WorkflowError::InvalidDeadline {
            reason: format!("deadline {hours} hours from now overflows the time range"),
        })
}
