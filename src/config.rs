//! Settings loaded from the environment (after `.env`)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::clock::moscow_tz;
use crate::rewards::{Milestone, MilestoneRule, RewardPolicy};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Timer manager settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    /// Full inactivity window before removal
    pub full_duration: Duration,
    /// How long before removal the warning is sent
    pub warning_lead: Duration,
    /// Ban length applied on removal
    pub ban_duration: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            full_duration: Duration::from_secs(7 * DAY_SECS),
            warning_lead: Duration::from_secs(DAY_SECS),
            ban_duration: Duration::from_secs(30 * DAY_SECS),
        }
    }
}

/// Calories-to-cups exchange terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTerms {
    pub rate: i64,
    pub cups_per_exchange: i64,
}

impl Default for ExchangeTerms {
    fn default() -> Self {
        Self { rate: 100, cups_per_exchange: 42 }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub owner_id: Option<i64>,
    pub reference_tz: FixedOffset,
    pub timers: TimerSettings,
    pub rewards: RewardPolicy,
    pub exchange: ExchangeTerms,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("fatleopard.db"),
            owner_id: None,
            reference_tz: moscow_tz(),
            timers: TimerSettings::default(),
            rewards: RewardPolicy::default(),
            exchange: ExchangeTerms::default(),
        }
    }
}

impl Settings {
    /// Read settings from environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = lookup("DB_PATH").map_or(defaults.db_path, PathBuf::from);

        let owner_id = match lookup("OWNER_ID") {
            Some(raw) if raw.trim() == "0" || raw.trim().is_empty() => None,
            Some(raw) => Some(parse_var::<i64>("OWNER_ID", &raw)?),
            None => None,
        };

        let reference_tz = match lookup("REFERENCE_TZ") {
            Some(raw) => FixedOffset::from_str(raw.trim()).map_err(|_| ConfigError::InvalidValue {
                key: "REFERENCE_TZ",
                reason: format!("'{}' is not a UTC offset like +03:00", raw),
            })?,
            None => defaults.reference_tz,
        };

        let timers = TimerSettings {
            full_duration: secs_var(&lookup, "TIMER_DURATION_SECS", defaults.timers.full_duration)?,
            warning_lead: secs_var(&lookup, "WARNING_LEAD_SECS", defaults.timers.warning_lead)?,
            ban_duration: secs_var(&lookup, "BAN_DURATION_SECS", defaults.timers.ban_duration)?,
        };
        if timers.full_duration.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "TIMER_DURATION_SECS",
                reason: "must be positive".to_owned(),
            });
        }

        let exchange = ExchangeTerms {
            rate: int_var(&lookup, "EXCHANGE_RATE", defaults.exchange.rate)?,
            cups_per_exchange: int_var(&lookup, "CUPS_PER_EXCHANGE", defaults.exchange.cups_per_exchange)?,
        };
        if exchange.rate <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "EXCHANGE_RATE",
                reason: "must be positive".to_owned(),
            });
        }

        let base = defaults.rewards;
        let milestones = match lookup("MILESTONES") {
            Some(raw) => parse_milestones(&raw)?,
            None => base.milestones.clone(),
        };
        let rewards = RewardPolicy {
            calories_per_streak_day: int_var(&lookup, "CALORIES_PER_STREAK_DAY", base.calories_per_streak_day)?,
            sick_return_bonus: int_var(&lookup, "SICK_RETURN_BONUS", base.sick_return_bonus)?,
            cups_per_training: int_var(&lookup, "CUPS_PER_TRAINING", base.cups_per_training)?,
            extra_training_cups: int_var(&lookup, "EXTRA_TRAINING_CUPS", base.extra_training_cups)?,
            milestones,
        };

        Ok(Self {
            db_path,
            owner_id,
            reference_tz,
            timers,
            rewards,
            exchange,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        reason: format!("cannot parse '{}'", raw),
    })
}

fn int_var(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: i64) -> Result<i64, ConfigError> {
    lookup(key).map_or(Ok(default), |raw| parse_var(key, &raw))
}

fn secs_var(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    lookup(key).map_or(Ok(default), |raw| parse_var::<u64>(key, &raw).map(Duration::from_secs))
}

/// Parse `kind:days:cups` entries separated by commas
pub fn parse_milestones(raw: &str) -> Result<Vec<MilestoneRule>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue { key: "MILESTONES", reason };

    let mut rules = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').collect();
        let [kind, days, cups] = parts.as_slice() else {
            return Err(invalid(format!("'{}' is not kind:days:cups", entry)));
        };
        let milestone = Milestone::from_str(kind).map_err(|_| invalid(format!("unknown milestone '{}'", kind)))?;
        let days: u32 = days.parse().map_err(|_| invalid(format!("bad days in '{}'", entry)))?;
        let cups: i64 = cups.parse().map_err(|_| invalid(format!("bad cups in '{}'", entry)))?;
        if days == 0 {
            return Err(invalid(format!("'{}' has zero days", entry)));
        }
        if rules.iter().any(|r: &MilestoneRule| r.days == days || r.milestone == milestone) {
            return Err(invalid(format!("duplicate milestone in '{}'", entry)));
        }
        rules.push(MilestoneRule { milestone, days, cups });
    }
    rules.sort_by_key(|r| r.days);
    Ok(rules)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
