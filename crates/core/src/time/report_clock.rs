use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

// A bare date pins the run to midday UTC so every offset within +-12h keeps the same date stamp.
const DATE_ONLY_HOUR_UTC: u32 = 12;

/// Resolves the instant a report is issued at. Accepts `YYYY-MM-DD` or RFC 3339; defaults to now.
pub fn resolve_issued_at(
    issued_at_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<DateTime<Utc>> {
    let Some(s) = issued_at_arg.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(now_utc);
    };

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let noon = NaiveTime::from_hms_opt(DATE_ONLY_HOUR_UTC, 0, 0).context("invalid time")?;
        return Ok(date.and_time(noon).and_utc());
    }

    let parsed = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("issued-at must be YYYY-MM-DD or RFC 3339 (got {s})"))?;
    Ok(parsed.with_timezone(&Utc))
}

/// The calendar date printed on a report, in the configured local offset.
pub fn report_date(issued_at: DateTime<Utc>, utc_offset_minutes: i32) -> anyhow::Result<NaiveDate> {
    let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
        .with_context(|| format!("invalid UTC offset: {utc_offset_minutes} minutes"))?;
    Ok(issued_at.with_timezone(&offset).date_naive())
}
