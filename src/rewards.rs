//! Streak & reward engine
//!
//! Pure computation: given a member's prior state and today's date in the
//! reference timezone, decide how many calories a training report earns,
//! what the new streak is, and which milestone (if any) fires.
//!
//! Calorie policy: calories earned = calorie streak length x
//! `calories_per_streak_day`, plus `sick_return_bonus` on the first report
//! after a sick leave.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::UserRecord;

/// Streak milestones, each firing exactly once when the streak first reaches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    Weekly,
    TwoWeeks,
    ThreeWeeks,
    Monthly,
    Quarterly,
}

impl Milestone {
    pub fn key(&self) -> &'static str {
        match self {
            Milestone::Weekly => "weekly",
            Milestone::TwoWeeks => "two_weeks",
            Milestone::ThreeWeeks => "three_weeks",
            Milestone::Monthly => "monthly",
            Milestone::Quarterly => "quarterly",
        }
    }

    pub fn title_ru(&self) -> &'static str {
        match self {
            Milestone::Weekly => "недельную",
            Milestone::TwoWeeks => "двухнедельную",
            Milestone::ThreeWeeks => "трехнедельную",
            Milestone::Monthly => "месячную",
            Milestone::Quarterly => "квартальную",
        }
    }

    pub fn all() -> &'static [Milestone] {
        &[
            Milestone::Weekly,
            Milestone::TwoWeeks,
            Milestone::ThreeWeeks,
            Milestone::Monthly,
            Milestone::Quarterly,
        ]
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Milestone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Milestone::all()
            .iter()
            .copied()
            .find(|m| m.key() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown milestone '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRule {
    pub milestone: Milestone,
    pub days: u32,
    pub cups: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardPolicy {
    pub calories_per_streak_day: i64,
    pub sick_return_bonus: i64,
    pub cups_per_training: i64,
    /// Consolation cups for a repeat report on the same day (0 disables)
    pub extra_training_cups: i64,
    /// Sorted by `days`, distinct
    pub milestones: Vec<MilestoneRule>,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            calories_per_streak_day: 1,
            sick_return_bonus: 2,
            cups_per_training: 1,
            extra_training_cups: 1,
            milestones: vec![
                MilestoneRule { milestone: Milestone::Weekly, days: 7, cups: 42 },
                MilestoneRule { milestone: Milestone::TwoWeeks, days: 14, cups: 42 },
                MilestoneRule { milestone: Milestone::ThreeWeeks, days: 21, cups: 42 },
                MilestoneRule { milestone: Milestone::Monthly, days: 30, cups: 420 },
                MilestoneRule { milestone: Milestone::Quarterly, days: 90, cups: 4200 },
            ],
        }
    }
}

impl RewardPolicy {
    /// Milestone reached exactly at `streak`, if any
    pub fn milestone_at(&self, streak: u32) -> Option<MilestoneRule> {
        self.milestones.iter().copied().find(|rule| rule.days == streak)
    }
}

/// Result of evaluating one training report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingOutcome {
    /// False when the member already reported today
    pub counted: bool,
    pub calories_to_add: i64,
    pub new_streak: u32,
    pub new_calorie_streak: u32,
    /// Cups for this report, milestone payout excluded
    pub cups_to_add: i64,
    pub milestone: Option<MilestoneRule>,
    pub sick_bonus: bool,
}

impl TrainingOutcome {
    pub fn milestone_cups(&self) -> i64 {
        self.milestone.map_or(0, |rule| rule.cups)
    }

    pub fn total_cups(&self) -> i64 {
        self.cups_to_add + self.milestone_cups()
    }
}

/// Next value of a consecutive-day counter
fn next_streak(last: Option<NaiveDate>, current: u32, today: NaiveDate) -> u32 {
    match last {
        Some(date) if today.pred_opt() == Some(date) => current + 1,
        Some(_) => 1,
        // No date on record but a streak exists: carried-over data, continue it
        None if current > 0 => current + 1,
        None => 1,
    }
}

pub fn compute_training_outcome(record: &UserRecord, today: NaiveDate, policy: &RewardPolicy) -> TrainingOutcome {
    // Any report clears a sick leave, so the return bonus is paid even on a repeat
    let sick_bonus = record.sick_leave.is_some();
    let bonus = if sick_bonus { policy.sick_return_bonus } else { 0 };

    if record.last_training_date == Some(today) {
        debug!(user_id = record.user_id, "already trained today, streak not counted");
        return TrainingOutcome {
            counted: false,
            calories_to_add: bonus,
            new_streak: record.streak_days,
            new_calorie_streak: record.calorie_streak_days,
            cups_to_add: policy.extra_training_cups,
            milestone: None,
            sick_bonus,
        };
    }

    let new_streak = next_streak(record.last_training_date, record.streak_days, today);
    let new_calorie_streak = next_streak(record.last_training_date, record.calorie_streak_days, today);

    let calories_to_add = i64::from(new_calorie_streak) * policy.calories_per_streak_day + bonus;

    let outcome = TrainingOutcome {
        counted: true,
        calories_to_add,
        new_streak,
        new_calorie_streak,
        cups_to_add: policy.cups_per_training,
        milestone: policy.milestone_at(new_streak),
        sick_bonus,
    };
    debug!(user_id = record.user_id, ?outcome, "training outcome computed");
    outcome
}
