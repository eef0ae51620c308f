//! Cron schedule validation and next-occurrence math.
//!
//! Missions store five-field cron expressions evaluated in an IANA
//! timezone. The `cron` crate wants a seconds field, so expressions are
//! normalised before parsing.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{LlmHelper, ParsedSchedule};

/// Normalise a five-field cron expression for the `cron` crate by
/// prepending a zero seconds field.
fn normalise(cron_expr: &str) -> DomainResult<String> {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(DomainError::Validation(format!(
            "Invalid cron format: '{cron_expr}' (expected 5 fields: minute hour day month weekday)"
        )));
    }
    Ok(format!("0 {}", fields.join(" ")))
}

/// Validate a five-field cron expression.
pub fn validate_cron(cron_expr: &str) -> DomainResult<Schedule> {
    let normalised = normalise(cron_expr)?;
    Schedule::from_str(&normalised)
        .map_err(|e| DomainError::Validation(format!("Invalid cron expression '{cron_expr}': {e}")))
}

pub fn is_valid_cron(cron_expr: &str) -> bool {
    validate_cron(cron_expr).is_ok()
}

/// Validate an IANA timezone name.
pub fn validate_timezone(name: &str) -> DomainResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| DomainError::Validation(format!("Invalid timezone: '{name}'")))
}

/// Next occurrence of the cron expression strictly after `after`, evaluated
/// in the given timezone, returned in UTC.
pub fn next_occurrence(
    cron_expr: &str,
    timezone: &str,
    after: DateTime<Utc>,
) -> DomainResult<DateTime<Utc>> {
    let schedule = validate_cron(cron_expr)?;
    let tz = validate_timezone(timezone)?;
    let local = after.with_timezone(&tz);
    schedule
        .after(&local)
        .next()
        .map(|next| next.with_timezone(&Utc))
        .ok_or_else(|| {
            DomainError::Validation(format!("Cron expression '{cron_expr}' never fires"))
        })
}

/// Resolve a natural-language schedule into a validated cron expression and
/// timezone via the helper model.
pub async fn parse_natural_schedule(
    helper: &Arc<dyn LlmHelper>,
    natural: &str,
) -> DomainResult<ParsedSchedule> {
    let parsed = helper.parse_schedule(natural).await?;
    validate_cron(&parsed.cron)?;
    validate_timezone(&parsed.timezone)?;
    tracing::info!(
        natural = natural,
        cron = %parsed.cron,
        timezone = %parsed.timezone,
        "Parsed natural-language schedule"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_standard_expressions() {
        assert!(is_valid_cron("0 18 * * *"));
        assert!(is_valid_cron("30 8 * * 1-5"));
        assert!(is_valid_cron("0 */2 * * *"));
        assert!(is_valid_cron("0 12 1 * *"));
    }

    #[test]
    fn rejects_wrong_field_count_and_garbage() {
        assert!(!is_valid_cron("0 18 * *"));
        assert!(!is_valid_cron("0 18 * * * *"));
        assert!(!is_valid_cron("not a cron"));
        assert!(!is_valid_cron("99 99 * * *"));
    }

    #[test]
    fn timezone_validation() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn next_occurrence_weekday_morning() {
        // Wednesday 2024-01-03 09:00 UTC; next weekday 8:30 is Thursday.
        let after = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let next = next_occurrence("30 8 * * 1-5", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 4, 8, 30, 0).unwrap());
    }

    #[test]
    fn next_occurrence_skips_weekend() {
        // Friday 2024-01-05 10:00 UTC; next weekday 8:30 is Monday.
        let after = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let next = next_occurrence("30 8 * * 1-5", "UTC", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 8, 8, 30, 0).unwrap());
    }

    #[test]
    fn next_occurrence_respects_timezone() {
        // 18:00 in New York during EST is 23:00 UTC.
        let after = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let next = next_occurrence("0 18 * * *", "America/New_York", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 3, 23, 0, 0).unwrap());
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2024, 1, 3, 8, 30, 0).unwrap();
        let next = next_occurrence("30 8 * * *", "UTC", after).unwrap();
        assert!(next > after);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 4, 8, 30, 0).unwrap());
    }
}
