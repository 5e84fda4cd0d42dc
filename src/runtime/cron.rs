/// Next-run evaluator for scheduled workflows
///
/// The common shapes are computed directly:
/// - `*/N * * * *`: every N minutes from now
/// - `0 * * * *` / `@hourly`: next top of the hour
/// - `0 0 * * *` / `@daily` / `@midnight`: next midnight
/// - `0 0 * * 0` / `@weekly`: next Sunday midnight
///
/// Other 5, 6 or 7 field expressions go through the `cron` crate. Anything
/// that does not parse runs one hour from now. All times are UTC and the
/// result is always strictly after `now`.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Delay used for expressions that cannot be evaluated
pub const FALLBACK_DELAY_MINUTES: i64 = 60;

/// Compute the next run time after `now`
pub fn next_run(expression: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let expression = expression.trim();

    let next = match expression {
        "@hourly" | "0 * * * *" => Some(next_hour(now)),
        "@daily" | "@midnight" | "0 0 * * *" => Some(next_midnight(now, 1)),
        "@weekly" | "0 0 * * 0" => Some(next_sunday(now)),
        _ => match every_n_minutes(expression) {
            Some(minutes) => Duration::try_minutes(minutes)
                .and_then(|delay| now.checked_add_signed(delay)),
            None => from_cron_crate(expression, now),
        },
    };

    match next.filter(|next| *next > now) {
        Some(next) => next,
        None => {
            tracing::warn!(
                "⏰ Unrecognised schedule '{}', running again in {} minutes",
                expression,
                FALLBACK_DELAY_MINUTES
            );
            now + Duration::minutes(FALLBACK_DELAY_MINUTES)
        }
    }
}

/// True when the expression is understood without falling back
pub fn is_recognised(expression: &str) -> bool {
    let expression = expression.trim();
    matches!(
        expression,
        "@hourly" | "@daily" | "@midnight" | "@weekly" | "0 * * * *" | "0 0 * * *" | "0 0 * * 0"
    ) || every_n_minutes(expression).is_some()
        || parse_schedule(expression).is_some()
}

/// `*/N * * * *` with N >= 1
fn every_n_minutes(expression: &str) -> Option<i64> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, rest @ ..] = fields.as_slice() else {
        return None;
    };
    if rest.len() != 4 || rest.iter().any(|field| *field != "*") {
        return None;
    }
    minute
        .strip_prefix("*/")
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 1)
}

fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    truncated + Duration::hours(1)
}

fn next_midnight(now: DateTime<Utc>, days_ahead: i64) -> DateTime<Utc> {
    let date = now.date_naive() + Duration::days(days_ahead);
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn next_sunday(now: DateTime<Utc>) -> DateTime<Utc> {
    let days = match now.weekday().num_days_from_sunday() {
        0 => 7,
        n => 7 - i64::from(n),
    };
    next_midnight(now, days)
}

/// Parse with the `cron` crate, which expects a leading seconds field
///
/// Five-field input is Unix cron, so its day-of-week numbers (0-7, Sunday is
/// 0 or 7) are shifted onto the crate's 1-7 with Sunday as 1.
fn parse_schedule(expression: &str) -> Option<Schedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalised = match fields.as_slice() {
        [minute, hour, day, month, weekday] => format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            day,
            month,
            unix_day_of_week(weekday)?
        ),
        fields if fields.len() == 6 || fields.len() == 7 => fields.join(" "),
        _ => return None,
    };
    Schedule::from_str(&normalised).ok()
}

/// Translate a Unix day-of-week field into the `cron` crate numbering
fn unix_day_of_week(field: &str) -> Option<String> {
    let parts = field
        .split(',')
        .map(unix_day_of_week_part)
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(","))
}

fn unix_day_of_week_part(part: &str) -> Option<String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };
    let with_step = |range: String| match step {
        Some(step) => format!("{}/{}", range, step),
        None => range,
    };

    if range == "*" || range == "?" {
        return Some(with_step(range.to_string()));
    }

    match range.split_once('-') {
        Some((start, end)) => match (start.parse::<u8>(), end.parse::<u8>()) {
            (Ok(start), Ok(end)) if start <= end && end <= 7 => {
                let first = shift_day(start);
                if end == 7 && start > 0 {
                    // Sunday wraps to 1, so split the range around it
                    if step.is_some() {
                        return None;
                    }
                    match first {
                        7 => Some("7,1".to_string()),
                        first => Some(format!("{}-7,1", first)),
                    }
                } else {
                    Some(with_step(format!("{}-{}", first, shift_day(end))))
                }
            }
            (Err(_), Err(_)) => Some(with_step(range.to_string())),
            _ => None,
        },
        None => match range.parse::<u8>() {
            Ok(day) if day <= 7 => Some(with_step(shift_day(day).to_string())),
            Ok(_) => None,
            Err(_) => Some(with_step(range.to_string())),
        },
    }
}

fn shift_day(day: u8) -> u8 {
    match day {
        0 | 7 => 1,
        n => n + 1,
    }
}

fn from_cron_crate(expression: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_schedule(expression)?.after(&now).next()
}
