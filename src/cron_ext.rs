use cron::Schedule;
use std::str::FromStr;
use time::OffsetDateTime;

/// This system accepts the standard 5-field POSIX cron dialect (minute hour
/// day-of-month month day-of-week), UTC, minute precision - unlike the 6-field,
/// seconds-required dialect used elsewhere in this codebase's scheduler lineage. Parsing is done
/// with the `cron` crate rather than that dialect's parser, by prepending a literal `0` seconds
/// field before handing the expression to it.
pub fn parse_schedule(expression: &str) -> anyhow::Result<Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        anyhow::bail!(
            "Cron expression must have exactly 5 fields (minute hour day-of-month month \
             day-of-week), got {}.",
            fields.len()
        );
    }

    let with_seconds = format!("0 {expression}");
    Schedule::from_str(&with_seconds)
        .map_err(|err| anyhow::anyhow!("Invalid cron expression `{expression}`: {err}"))
}

/// Classifies a cron expression as one-shot: all of minute, hour, day-of-month, and
/// month are literal digits (no lists, ranges, steps, or wildcards) and day-of-week is `*`. Such
/// an expression describes exactly one absolute instant per year, so it is scheduled as a
/// single-fire job rather than a recurring one.
pub fn is_one_shot(expression: &str) -> bool {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }

    let is_literal_digits = |field: &str| !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit());
    fields[0..4].iter().all(|field| is_literal_digits(field)) && fields[4] == "*"
}

/// Returns the next occurrence strictly after `after`, if the schedule has one.
pub fn next_occurrence(schedule: &Schedule, after: OffsetDateTime) -> Option<OffsetDateTime> {
    let after_chrono = chrono::DateTime::from_timestamp(after.unix_timestamp(), 0)?;
    let next = schedule.after(&after_chrono).next()?;
    OffsetDateTime::from_unix_timestamp(next.timestamp()).ok()
}

/// Truncates a timestamp down to minute precision, per this system's "no sub-minute precision"
/// guarantee.
pub fn round_to_minute(timestamp: OffsetDateTime) -> OffsetDateTime {
    timestamp.replace_second(0).and_then(|t| t.replace_nanosecond(0)).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::{is_one_shot, next_occurrence, parse_schedule, round_to_minute};
    use time::macros::datetime;

    #[test]
    fn recognizes_one_shot_expressions() {
        assert!(is_one_shot("30 9 15 6 *"));
        assert!(!is_one_shot("30 9 * * 1"));
        assert!(!is_one_shot("*/5 9 15 6 *"));
        assert!(!is_one_shot("30 9 15 6 1"));
    }

    #[test]
    fn parses_valid_five_field_expression() {
        assert!(parse_schedule("30 9 * * 1").is_ok());
        assert!(parse_schedule("bogus").is_err());
    }

    #[test]
    fn computes_next_occurrence_after_a_given_instant() {
        let schedule = parse_schedule("0 9 * * *").unwrap();
        let after = datetime!(2026-01-15 10:00:00 UTC);
        let next = next_occurrence(&schedule, after).unwrap();
        assert_eq!(next, datetime!(2026-01-16 09:00:00 UTC));
    }

    #[test]
    fn rounds_down_to_the_minute() {
        let timestamp = datetime!(2026-01-15 10:00:42.500 UTC);
        assert_eq!(round_to_minute(timestamp), datetime!(2026-01-15 10:00:00 UTC));
    }
}
