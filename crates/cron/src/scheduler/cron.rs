//! Cron normalization and parsing helpers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::CronError;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Pushed task lists mostly use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub(crate) fn normalize_cron(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        // 6/7-field or a descriptor such as "@hourly"; pass through.
        trimmed.to_string()
    }
}

/// Parse a task's cron expression, accepting 5-field and 6-field forms.
pub fn parse_schedule(expression: &str) -> Result<Schedule, CronError> {
    Schedule::from_str(&normalize_cron(expression)).map_err(|source| CronError::Schedule {
        expression: expression.to_string(),
        source,
    })
}

/// First matching instant strictly after `after`.
pub(crate) fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}
