//! Member record types

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::non_negative;

/// Sick leave state; present from `#sick_leave` until the next counted training
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SickLeave {
    pub started_at: DateTime<FixedOffset>,
    /// Set by `#healthy`; `None` while the member is still sick
    pub ended_at: Option<DateTime<FixedOffset>>,
    /// Total time spent sick, filled in on recovery
    pub accumulated: Duration,
    /// Time left on the removal timer when the leave began
    pub frozen_remaining: Duration,
}

impl SickLeave {
    pub fn begin(started_at: DateTime<FixedOffset>, frozen_remaining: Duration) -> Self {
        Self {
            started_at,
            ended_at: None,
            accumulated: Duration::ZERO,
            frozen_remaining,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Close the leave at `ended_at`, adding its length to `accumulated`
    pub fn finish(&mut self, ended_at: DateTime<FixedOffset>) {
        self.accumulated += non_negative(ended_at - self.started_at);
        self.ended_at = Some(ended_at);
    }
}

/// Persistent state of one member in one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: String,
    pub calories: i64,
    pub cups: i64,
    /// Consecutive training days, drives milestones
    pub streak_days: u32,
    /// Consecutive training days since the last exchange, drives calories
    pub calorie_streak_days: u32,
    pub last_training_date: Option<NaiveDate>,
    pub last_message_at: Option<DateTime<FixedOffset>>,
    pub timer_started_at: Option<DateTime<FixedOffset>>,
    /// Length of the running timer; `None` means the full configured duration
    pub timer_duration: Option<Duration>,
    pub sick_leave: Option<SickLeave>,
    pub exempt_from_removal: bool,
    pub is_deleted: bool,
}

impl UserRecord {
    pub fn new(user_id: i64, chat_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            display_name: display_name.into(),
            calories: 0,
            cups: 0,
            streak_days: 0,
            calorie_streak_days: 0,
            last_training_date: None,
            last_message_at: None,
            timer_started_at: None,
            timer_duration: None,
            sick_leave: None,
            exempt_from_removal: false,
            is_deleted: false,
        }
    }

    pub fn is_on_sick_leave(&self) -> bool {
        self.sick_leave.as_ref().is_some_and(SickLeave::is_active)
    }

    pub fn timer_duration_or(&self, full: Duration) -> Duration {
        self.timer_duration.unwrap_or(full)
    }

    /// Short status label for listings
    pub fn status(&self) -> &'static str {
        if self.is_deleted {
            "removed"
        } else if self.is_on_sick_leave() {
            "sick"
        } else if self.exempt_from_removal {
            "exempt"
        } else {
            "active"
        }
    }
}

/// Display label: `@handle`, else full name, else `User<id>`
pub fn display_name(user_id: i64, username: Option<&str>, first_name: &str, last_name: Option<&str>) -> String {
    if let Some(handle) = username.filter(|h| !h.is_empty()) {
        return format!("@{}", handle);
    }
    if !first_name.is_empty() {
        return match last_name.filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {}", first_name, last),
            None => first_name.to_string(),
        };
    }
    format!("User{}", user_id)
}
