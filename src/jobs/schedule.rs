// src/jobs/schedule.rs

//! Five-field cron schedules evaluated in a fixed-offset timezone.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, SubsecRound, Utc};
use croner::Cron;

use crate::errors::{EthosError, Result};

/// A validated cron expression plus the timezone it is read in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expr: String,
    tz: FixedOffset,
}

impl Schedule {
    pub fn parse(expr: &str, tz: FixedOffset) -> Result<Self> {
        let expr = expr.trim();
        if expr.split_whitespace().count() != 5 {
            return Err(EthosError::ConfigError(format!(
                "schedule '{expr}' must have five fields (minute hour day month weekday)"
            )));
        }
        parse_cron(expr)?;
        Ok(Self {
            expr: expr.to_string(),
            tz,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn timezone(&self) -> FixedOffset {
        self.tz
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let cron = parse_cron(&self.expr)?;
        // Fire times land on whole seconds.
        let after = after.trunc_subsecs(0);
        let local = after.with_timezone(&self.tz);
        cron.find_next_occurrence(&local, false)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                EthosError::ConfigError(format!("no next occurrence for '{}': {e}", self.expr))
            })
    }
}

fn parse_cron(expr: &str) -> Result<Cron> {
    expr.parse::<Cron>()
        .map_err(|e| EthosError::ConfigError(format!("invalid cron expression '{expr}': {e}")))
}

/// Parse `"UTC"`, `"Z"` or a `±HH:MM` offset.
pub fn parse_timezone(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return Ok(Utc.fix());
    }

    let invalid = || {
        EthosError::ConfigError(format!(
            "invalid timezone '{value}' (expected \"UTC\" or an offset like \"+02:00\")"
        ))
    };

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Calendar date of `at` in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        parse_timezone("UTC").unwrap()
    }

    #[test]
    fn rejects_non_five_field_expressions() {
        assert!(Schedule::parse("* * * *", utc()).is_err());
        assert!(Schedule::parse("0 0 * * * *", utc()).is_err());
        assert!(Schedule::parse("61 * * * *", utc()).is_err());
    }

    #[test]
    fn next_fire_time_in_utc() {
        let schedule = Schedule::parse("0 */6 * * *", utc()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 7, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_fire_time_drops_subseconds() {
        let schedule = Schedule::parse("0 0 * * *", utc()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(500);
        assert_eq!(
            schedule.next_after(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap()
        );

        let just_fired = Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap() + chrono::Duration::milliseconds(300);
        assert_eq!(
            schedule.next_after(just_fired).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_fire_time_respects_offset() {
        let tz = parse_timezone("+02:00").unwrap();
        let schedule = Schedule::parse("0 0 * * *", tz).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        // Local midnight at +02:00 is 22:00 UTC the previous evening.
        assert_eq!(
            schedule.next_after(now).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn timezone_parsing() {
        assert_eq!(parse_timezone("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(parse_timezone("Europe/Oslo").is_err());
        assert!(parse_timezone("+25:00").is_err());
    }

    #[test]
    fn local_date_shifts_across_midnight() {
        let tz = parse_timezone("+02:00").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 23, 0, 0).unwrap();
        assert_eq!(local_date(at, tz), NaiveDate::from_ymd_opt(2026, 5, 2).unwrap());
    }
}
