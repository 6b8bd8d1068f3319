//! Coach - reacts to chat events
//!
//! Glue between inbound events (messages, hashtags, joins, commands), the
//! reward engine, the member store and the timer manager. Hashtag flows
//! answer in the chat themselves; command helpers return the reply text.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::Settings;
use crate::db::{Database, StoreStats, UserRecord};
use crate::exchange::{ExchangeOutcome, crossed_exchange_threshold};
use crate::messages::{self, SUPER_LEVEL_CUPS};
use crate::moderation::{ModerationActions, Target};
use crate::rewards::{TrainingOutcome, compute_training_outcome};
use crate::timers::{SickLeaveEnd, SickLeaveStart, StartOutcome, TimerManager};

/// How a plain message changed the member's record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Created,
    Revived,
    Seen,
}

/// Everything a training report changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    pub outcome: TrainingOutcome,
    pub calories_total: i64,
    pub cups_total: i64,
    pub exchange_unlocked: bool,
    pub super_level: bool,
}

pub struct Coach {
    db: Arc<Mutex<Database>>,
    timers: TimerManager,
    actions: ModerationActions,
    clock: Clock,
    settings: Settings,
}

impl Coach {
    pub fn new(db: Arc<Mutex<Database>>, timers: TimerManager, actions: ModerationActions, clock: Clock, settings: Settings) -> Self {
        Self {
            db,
            timers,
            actions,
            clock,
            settings,
        }
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Owner or chat administrator
    pub async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        self.is_owner(user_id) || self.actions.is_admin(chat_id, user_id).await
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.settings.owner_id == Some(user_id)
    }

    async fn say(&self, chat_id: i64, text: &str) {
        self.actions.notify(chat_id, text).await;
    }

    async fn load(&self, who: &Target) -> Option<UserRecord> {
        let db = self.db.lock().await;
        match db.get_record(who.user_id, who.chat_id) {
            Ok(record) => record,
            Err(e) => {
                error!(user_id = who.user_id, chat_id = who.chat_id, "Failed to load member: {:#}", e);
                None
            }
        }
    }

    /// Any message: refresh name and last-seen, revive, and make sure a timer runs
    pub async fn observe_message(&self, who: &Target) -> Presence {
        let now = self.clock.now();
        let existing = self.load(who).await;

        let presence = {
            let db = self.db.lock().await;
            let result = match &existing {
                None => {
                    let mut record = UserRecord::new(who.user_id, who.chat_id, who.display_name.clone());
                    record.last_message_at = Some(now);
                    db.save_record(&record).map(|_| Presence::Created)
                }
                Some(record) => db
                    .update_presence(who.user_id, who.chat_id, &who.display_name, now)
                    .map(|_| if record.is_deleted { Presence::Revived } else { Presence::Seen }),
            };
            match result {
                Ok(presence) => presence,
                Err(e) => {
                    error!(user_id = who.user_id, chat_id = who.chat_id, "Failed to record message: {:#}", e);
                    Presence::Seen
                }
            }
        };

        match presence {
            Presence::Created => info!(user_id = who.user_id, chat_id = who.chat_id, "New member {} seen", who.display_name),
            Presence::Revived => info!(user_id = who.user_id, chat_id = who.chat_id, "Member {} is back", who.display_name),
            Presence::Seen => {}
        }

        if !self.timers.is_running(who.user_id, who.chat_id).await {
            self.timers.start_full(who.clone()).await;
        }
        presence
    }

    /// New member: fresh record, full timer, welcome
    pub async fn member_joined(&self, who: &Target) {
        {
            let db = self.db.lock().await;
            let record = UserRecord::new(who.user_id, who.chat_id, who.display_name.clone());
            if let Err(e) = db.save_record(&record) {
                error!(user_id = who.user_id, chat_id = who.chat_id, "Failed to create member: {:#}", e);
            }
        }
        self.timers.start_full(who.clone()).await;

        let timers = self.timers.settings();
        let text = messages::welcome(
            &who.display_name,
            &self.settings.rewards,
            &self.settings.exchange,
            timers.full_duration,
            timers.warning_lead,
        );
        self.say(who.chat_id, &text).await;
        info!(user_id = who.user_id, chat_id = who.chat_id, "Welcomed {}", who.display_name);
    }

    /// `#training_done`
    pub async fn training_report(&self, who: &Target) -> TrainingReport {
        let now = self.clock.now();
        let today = self.clock.date_of(now);
        let record = match self.load(who).await {
            Some(record) => record,
            None => {
                let record = UserRecord::new(who.user_id, who.chat_id, who.display_name.clone());
                if let Err(e) = self.db.lock().await.save_record(&record) {
                    error!(user_id = who.user_id, chat_id = who.chat_id, "Failed to create member: {:#}", e);
                }
                record
            }
        };

        let outcome = compute_training_outcome(&record, today, &self.settings.rewards);
        let (user_id, chat_id) = (who.user_id, who.chat_id);

        let (calories_total, cups_total) = {
            let db = self.db.lock().await;

            let calories_total = if outcome.calories_to_add != 0 {
                match db.add_calories(user_id, chat_id, outcome.calories_to_add) {
                    Ok(Some(total)) => total,
                    Ok(None) => record.calories + outcome.calories_to_add,
                    Err(e) => {
                        error!(user_id, chat_id, "Failed to add calories: {:#}", e);
                        record.calories + outcome.calories_to_add
                    }
                }
            } else {
                record.calories
            };

            let cups = outcome.total_cups();
            let cups_total = if cups != 0 {
                match db.add_cups(user_id, chat_id, cups) {
                    Ok(Some(total)) => total,
                    Ok(None) => record.cups + cups,
                    Err(e) => {
                        error!(user_id, chat_id, "Failed to add cups: {:#}", e);
                        record.cups + cups
                    }
                }
            } else {
                record.cups
            };

            if outcome.counted {
                if let Err(e) = db.update_streak(user_id, chat_id, outcome.new_streak, outcome.new_calorie_streak, today) {
                    error!(user_id, chat_id, "Failed to update streak: {:#}", e);
                }
            }

            // A report ends the sick leave, finished or not
            if record.sick_leave.is_some() {
                if let Err(e) = db.set_sick_leave(user_id, chat_id, None) {
                    error!(user_id, chat_id, "Failed to clear sick leave: {:#}", e);
                }
            }

            if let Err(e) = db.log_training(user_id, chat_id, &who.display_name, now) {
                warn!(user_id, chat_id, "Failed to log training: {:#}", e);
            }

            (calories_total, cups_total)
        };

        self.timers.start_full(who.clone()).await;

        let full = self.timers.settings().full_duration;
        let super_level = outcome.milestone.is_some() && cups_total > SUPER_LEVEL_CUPS;
        match (outcome.counted, outcome.milestone) {
            (true, Some(rule)) => {
                let text = messages::milestone(&who.display_name, &rule, outcome.calories_to_add, cups_total);
                self.say(chat_id, &text).await;
                if super_level {
                    self.say(chat_id, &messages::super_level(&who.display_name, cups_total)).await;
                }
            }
            (true, None) => {
                let text = messages::training_accepted(
                    outcome.new_streak,
                    outcome.calories_to_add,
                    calories_total,
                    outcome.cups_to_add,
                    cups_total,
                    full,
                );
                self.say(chat_id, &text).await;
            }
            (false, _) => {
                self.say(chat_id, &messages::extra_training(outcome.cups_to_add, cups_total)).await;
            }
        }

        let exchange_unlocked = crossed_exchange_threshold(calories_total, outcome.calories_to_add, &self.settings.exchange);
        if exchange_unlocked {
            self.say(chat_id, &messages::exchange_unlocked(calories_total, &self.settings.exchange)).await;
        }

        info!(
            user_id,
            chat_id,
            "Training from {}: streak {}, +{} calories, +{} cups",
            who.display_name,
            outcome.new_streak,
            outcome.calories_to_add,
            outcome.total_cups()
        );

        TrainingReport {
            outcome,
            calories_total,
            cups_total,
            exchange_unlocked,
            super_level,
        }
    }

    /// `#sick_leave`
    pub async fn sick_leave(&self, who: &Target) -> SickLeaveStart {
        let result = self.timers.enter_sick_leave(who.user_id, who.chat_id, self.clock.now()).await;
        match result {
            SickLeaveStart::Started { frozen_remaining } => {
                self.say(who.chat_id, &messages::sick_leave_started(frozen_remaining)).await;
            }
            SickLeaveStart::AlreadySick { frozen_remaining } => {
                self.say(who.chat_id, &messages::sick_leave_already(frozen_remaining)).await;
            }
            SickLeaveStart::UnknownMember => {
                warn!(user_id = who.user_id, chat_id = who.chat_id, "Sick leave from unknown member");
            }
        }
        result
    }

    /// `#healthy`
    pub async fn healthy(&self, who: &Target) -> SickLeaveEnd {
        let result = self.timers.recover_from_sick_leave(who.user_id, who.chat_id, self.clock.now()).await;
        let text = match result {
            SickLeaveEnd::Resumed { remaining, timer: StartOutcome::Scheduled } => messages::healthy_resumed(remaining),
            SickLeaveEnd::Resumed { .. } => messages::healthy_without_timer(),
            SickLeaveEnd::Removed => messages::healthy_expired(),
            SickLeaveEnd::NotSick | SickLeaveEnd::UnknownMember => messages::not_sick(),
        };
        self.say(who.chat_id, &text).await;
        result
    }

    /// `#change`
    pub async fn exchange(&self, who: &Target) -> Option<ExchangeOutcome> {
        let terms = self.settings.exchange;
        let result = self.db.lock().await.apply_exchange(who.user_id, who.chat_id, &terms);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(user_id = who.user_id, chat_id = who.chat_id, "Exchange failed: {:#}", e);
                None
            }
        };

        let text = match &outcome {
            Some(done) if !done.is_insufficient() => {
                info!(
                    user_id = who.user_id,
                    chat_id = who.chat_id,
                    "Exchanged {} calories for {} cups",
                    done.calories_spent,
                    done.cups_gained
                );
                messages::exchange_done(done)
            }
            Some(done) => messages::exchange_insufficient(done.calories_left, &terms),
            None => messages::exchange_insufficient(0, &terms),
        };
        self.say(who.chat_id, &text).await;
        outcome
    }

    /// Exempt a member by name and stop their timer
    pub async fn set_exempt(&self, chat_id: i64, name: &str) -> String {
        let Some(record) = self.find(chat_id, name).await else {
            return messages::member_not_found(name);
        };
        if let Err(e) = self.db.lock().await.set_exempt(record.user_id, chat_id, true) {
            error!(user_id = record.user_id, chat_id, "Failed to set exemption: {:#}", e);
        }
        self.timers.cancel(record.user_id, chat_id).await;
        info!(user_id = record.user_id, chat_id, "{} exempted from removal", record.display_name);
        messages::exempt_set(&record.display_name)
    }

    /// Lift the exemption and start a full timer
    pub async fn remove_exempt(&self, chat_id: i64, name: &str) -> String {
        let Some(record) = self.find(chat_id, name).await else {
            return messages::member_not_found(name);
        };
        if let Err(e) = self.db.lock().await.set_exempt(record.user_id, chat_id, false) {
            error!(user_id = record.user_id, chat_id, "Failed to clear exemption: {:#}", e);
        }
        self.timers
            .start_full(Target::new(record.user_id, chat_id, record.display_name.clone()))
            .await;
        info!(user_id = record.user_id, chat_id, "{} no longer exempt", record.display_name);
        messages::exempt_removed(&record.display_name)
    }

    async fn find(&self, chat_id: i64, name: &str) -> Option<UserRecord> {
        match self.db.lock().await.find_by_name(chat_id, name) {
            Ok(record) => record,
            Err(e) => {
                error!(chat_id, "Member lookup failed: {:#}", e);
                None
            }
        }
    }

    /// Full timers for every active member of the chat; returns (started, skipped)
    pub async fn start_all_timers(&self, chat_id: i64) -> (usize, usize) {
        let records = match self.db.lock().await.list_active_records(chat_id) {
            Ok(records) => records,
            Err(e) => {
                error!(chat_id, "Failed to list members: {:#}", e);
                return (0, 0);
            }
        };

        let (mut started, mut skipped) = (0, 0);
        for record in records {
            let target = Target::new(record.user_id, chat_id, record.display_name);
            match self.timers.start_full(target).await {
                StartOutcome::Scheduled => started += 1,
                _ => skipped += 1,
            }
        }
        info!(chat_id, "Started {} timers, skipped {}", started, skipped);
        (started, skipped)
    }

    pub async fn leaderboard(&self, chat_id: i64) -> String {
        match self.db.lock().await.top_by_calories(chat_id, 10) {
            Ok(top) => messages::leaderboard(&top),
            Err(e) => {
                error!(chat_id, "Failed to load leaderboard: {:#}", e);
                messages::leaderboard(&[])
            }
        }
    }

    pub async fn points(&self, who: &Target) -> String {
        let record = self
            .load(who)
            .await
            .unwrap_or_else(|| UserRecord::new(who.user_id, who.chat_id, who.display_name.clone()));
        let trainings = self
            .db
            .lock()
            .await
            .count_trainings(who.user_id, who.chat_id)
            .unwrap_or_default();
        messages::points(&record, trainings)
    }

    pub async fn cups(&self, who: &Target) -> String {
        let record = self
            .load(who)
            .await
            .unwrap_or_else(|| UserRecord::new(who.user_id, who.chat_id, who.display_name.clone()));
        messages::cups(&record)
    }

    pub async fn list_users(&self, chat_id: i64) -> String {
        match self.db.lock().await.list_active_records(chat_id) {
            Ok(records) => messages::list_users(&records),
            Err(e) => {
                error!(chat_id, "Failed to list members: {:#}", e);
                messages::list_users(&[])
            }
        }
    }

    pub async fn stats(&self) -> String {
        let stats = match self.db.lock().await.stats() {
            Ok(stats) => stats,
            Err(e) => {
                error!("Failed to read store stats: {:#}", e);
                StoreStats::default()
            }
        };
        messages::db_stats(&stats, self.timers.active_count().await)
    }

    /// Owner broadcast into another chat
    pub async fn send_to_chat(&self, chat_id: i64, text: &str) -> bool {
        self.actions.notify(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::testing::RecordingModerator;
    use std::time::Duration;

    const CHAT: i64 = -100;

    struct Harness {
        coach: Coach,
        recorder: Arc<RecordingModerator>,
        db: Arc<Mutex<Database>>,
    }

    fn harness() -> Harness {
        let settings = Settings::default();
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let recorder = RecordingModerator::new();
        let actions = ModerationActions::new(recorder.clone(), settings.timers.ban_duration);
        let clock = Clock::default();
        let timers = TimerManager::new(db.clone(), actions.clone(), clock, settings.timers);
        let coach = Coach::new(db.clone(), timers, actions, clock, settings);
        Harness { coach, recorder, db }
    }

    fn leo() -> Target {
        Target::new(1, CHAT, "@leo")
    }

    async fn seed(h: &Harness, edit: impl FnOnce(&mut UserRecord)) {
        let mut record = UserRecord::new(1, CHAT, "@leo");
        edit(&mut record);
        h.db.lock().await.save_record(&record).unwrap();
    }

    async fn record(h: &Harness) -> UserRecord {
        h.db.lock().await.get_record(1, CHAT).unwrap().unwrap()
    }

    fn yesterday() -> chrono::NaiveDate {
        Clock::default().today().pred_opt().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_creates_record_and_timer() {
        let h = harness();
        assert_eq!(h.coach.observe_message(&leo()).await, Presence::Created);
        assert!(h.coach.timers().is_running(1, CHAT).await);
        let rec = record(&h).await;
        assert!(rec.last_message_at.is_some());
        assert!(rec.timer_started_at.is_some());

        assert_eq!(h.coach.observe_message(&Target::new(1, CHAT, "Leo Pard")).await, Presence::Seen);
        assert_eq!(record(&h).await.display_name, "Leo Pard");
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_revives_deleted_member() {
        let h = harness();
        seed(&h, |r| r.is_deleted = true).await;
        assert_eq!(h.coach.observe_message(&leo()).await, Presence::Revived);
        assert!(!record(&h).await.is_deleted);
        assert!(h.coach.timers().is_running(1, CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_training_report() {
        let h = harness();
        let report = h.coach.training_report(&leo()).await;
        assert!(report.outcome.counted);
        assert_eq!(report.calories_total, 1);
        assert_eq!(report.cups_total, 1);

        let rec = record(&h).await;
        assert_eq!(rec.streak_days, 1);
        assert_eq!(rec.last_training_date, Some(Clock::default().today()));
        assert!(h.coach.timers().is_running(1, CHAT).await);
        assert!(h.recorder.messages()[0].contains("Отчёт принят"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_report_same_day_only_consolation() {
        let h = harness();
        h.coach.training_report(&leo()).await;
        let second = h.coach.training_report(&leo()).await;
        assert!(!second.outcome.counted);
        assert_eq!(second.calories_total, 1);
        assert_eq!(second.cups_total, 2);
        assert_eq!(record(&h).await.streak_days, 1);
        assert_eq!(h.db.lock().await.count_trainings(1, CHAT).unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_weekly_milestone_pays_out() {
        let h = harness();
        seed(&h, |r| {
            r.last_training_date = Some(yesterday());
            r.streak_days = 6;
            r.calorie_streak_days = 6;
        })
        .await;

        let report = h.coach.training_report(&leo()).await;
        assert_eq!(report.outcome.new_streak, 7);
        assert_eq!(report.calories_total, 7);
        assert_eq!(report.cups_total, 1 + 42);
        assert!(!report.super_level);
        assert!(h.recorder.messages()[0].contains("недельную"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_super_level_after_monthly() {
        let h = harness();
        seed(&h, |r| {
            r.last_training_date = Some(yesterday());
            r.streak_days = 29;
            r.calorie_streak_days = 29;
            r.cups = 10;
        })
        .await;

        let report = h.coach.training_report(&leo()).await;
        assert_eq!(report.cups_total, 10 + 1 + 420);
        assert!(report.super_level);
        let messages = h.recorder.messages();
        assert!(messages[1].contains("СУПЕР-УРОВЕНЬ"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_while_sick_ends_leave_with_bonus() {
        let h = harness();
        h.coach.observe_message(&leo()).await;
        h.coach.sick_leave(&leo()).await;
        assert!(!h.coach.timers().is_running(1, CHAT).await);

        let report = h.coach.training_report(&leo()).await;
        assert!(report.outcome.sick_bonus);
        assert_eq!(report.calories_total, 1 + 2);
        assert_eq!(record(&h).await.sick_leave, None);
        assert!(h.coach.timers().is_running(1, CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_day_report_after_healthy_keeps_bonus() {
        let h = harness();
        h.coach.training_report(&leo()).await;
        h.coach.sick_leave(&leo()).await;
        h.coach.healthy(&leo()).await;

        let report = h.coach.training_report(&leo()).await;
        assert!(!report.outcome.counted);
        assert!(report.outcome.sick_bonus);
        assert_eq!(report.calories_total, 1 + 2);
        assert_eq!(record(&h).await.sick_leave, None);
        assert!(h.coach.timers().is_running(1, CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sick_then_healthy_resumes_timer() {
        let h = harness();
        h.coach.observe_message(&leo()).await;

        assert!(matches!(h.coach.sick_leave(&leo()).await, SickLeaveStart::Started { .. }));
        assert!(matches!(h.coach.sick_leave(&leo()).await, SickLeaveStart::AlreadySick { .. }));

        let end = h.coach.healthy(&leo()).await;
        assert!(matches!(end, SickLeaveEnd::Resumed { timer: StartOutcome::Scheduled, .. }));
        assert!(h.coach.timers().is_running(1, CHAT).await);
        // Leave stays on record until the next report
        assert!(record(&h).await.sick_leave.is_some());

        assert_eq!(h.coach.healthy(&leo()).await, SickLeaveEnd::NotSick);
        assert_eq!(h.recorder.messages().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_unlocked_notice() {
        let h = harness();
        seed(&h, |r| r.calories = 99).await;
        let report = h.coach.training_report(&leo()).await;
        assert!(report.exchange_unlocked);
        assert!(h.recorder.messages().iter().any(|m| m.contains("#change")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_flow() {
        let h = harness();
        seed(&h, |r| {
            r.calories = 250;
            r.calorie_streak_days = 5;
        })
        .await;

        let outcome = h.coach.exchange(&leo()).await.unwrap();
        assert_eq!(outcome.exchanges, 2);
        let rec = record(&h).await;
        assert_eq!(rec.calories, 50);
        assert_eq!(rec.cups, 84);
        assert_eq!(rec.calorie_streak_days, 0);

        let again = h.coach.exchange(&leo()).await.unwrap();
        assert!(again.is_insufficient());
        assert!(h.recorder.messages()[1].contains("Недостаточно"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_joined_welcomes() {
        let h = harness();
        h.coach.member_joined(&Target::new(9, CHAT, "@newbie")).await;
        assert!(h.coach.timers().is_running(9, CHAT).await);
        assert!(h.recorder.messages()[0].starts_with("@newbie, добро пожаловать"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exempt_toggle() {
        let h = harness();
        h.coach.observe_message(&leo()).await;

        assert!(h.coach.set_exempt(CHAT, "@leo").await.contains("исключен"));
        assert!(!h.coach.timers().is_running(1, CHAT).await);
        assert!(record(&h).await.exempt_from_removal);

        // Messages from an exempt member don't start a timer
        h.coach.observe_message(&leo()).await;
        assert!(!h.coach.timers().is_running(1, CHAT).await);

        h.coach.remove_exempt(CHAT, "leo").await;
        assert!(h.coach.timers().is_running(1, CHAT).await);

        assert!(h.coach.set_exempt(CHAT, "@ghost").await.contains("не найден"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_timers_skips_exempt() {
        let h = harness();
        for (id, name) in [(1, "@a"), (2, "@b"), (3, "@c")] {
            h.db.lock().await.save_record(&UserRecord::new(id, CHAT, name)).unwrap();
        }
        h.db.lock().await.set_exempt(3, CHAT, true).unwrap();

        assert_eq!(h.coach.start_all_timers(CHAT).await, (2, 1));
        assert_eq!(h.coach.timers().active_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_member_removed_after_full_duration() {
        let h = harness();
        h.coach.observe_message(&leo()).await;
        tokio::time::sleep(Duration::from_secs(7 * 86_400 + 1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
        assert!(record(&h).await.is_deleted);
    }

    #[tokio::test]
    async fn test_owner_is_admin() {
        let mut h = harness();
        h.coach.settings.owner_id = Some(7);
        assert!(h.coach.is_admin(CHAT, 7).await);
        assert!(!h.coach.is_admin(CHAT, 8).await);
        h.recorder.grant_admin(CHAT, 8);
        assert!(h.coach.is_admin(CHAT, 8).await);
    }
}
