//! Reference-timezone clock
//!
//! All day boundaries (streaks, "already trained today") and all persisted
//! timestamps use one fixed UTC offset. Moscow (UTC+3) by default.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

/// Moscow timezone offset (UTC+3)
pub fn moscow_tz() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).expect("UTC+3 is a valid offset")
}

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: FixedOffset,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(moscow_tz())
    }
}

impl Clock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Current instant in the reference offset
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Current calendar date in the reference offset
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Calendar date of an arbitrary instant in the reference offset
    pub fn date_of(&self, instant: DateTime<FixedOffset>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// RFC 3339 form used in the database
    pub fn format(&self, instant: DateTime<FixedOffset>) -> String {
        instant.with_timezone(&self.offset).to_rfc3339()
    }

    pub fn parse(&self, raw: &str) -> Result<DateTime<FixedOffset>> {
        let parsed = DateTime::parse_from_rfc3339(raw.trim())
            .with_context(|| format!("invalid timestamp '{}'", raw))?;
        Ok(parsed.with_timezone(&self.offset))
    }
}

/// Convert a chrono span to a std duration, clamping negatives to zero
pub fn non_negative(span: Duration) -> std::time::Duration {
    span.to_std().unwrap_or(std::time::Duration::ZERO)
}

/// Convert a std duration to a chrono span, saturating at ~100 years
pub fn span(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::days(36_500))
}
