//! Timer manager - per-member inactivity countdowns
//!
//! Each running timer owns two tasks: one sleeps until the warning edge, the
//! other until the removal edge. Both select on a cancellation token, and on
//! wake re-check their entry under the table lock, so a cancel that races a
//! wake-up can never double-fire. Starting a timer replaces (and cancels) the
//! previous entry for that member in the same critical section.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, non_negative, span};
use crate::config::TimerSettings;
use crate::db::{Database, SickLeave};
use crate::moderation::{ModerationActions, Target};

/// (user_id, chat_id)
type TimerKey = (i64, i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Warned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub started_at: DateTime<FixedOffset>,
    pub deadline: DateTime<FixedOffset>,
    /// Length scheduled when the timer was (re)started
    pub duration: Duration,
    pub state: TimerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Scheduled,
    Exempt,
    OnSickLeave,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SickLeaveStart {
    Started { frozen_remaining: Duration },
    AlreadySick { frozen_remaining: Duration },
    UnknownMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SickLeaveEnd {
    Resumed { remaining: Duration, timer: StartOutcome },
    /// Nothing was left on the clock when the leave began
    Removed,
    NotSick,
    UnknownMember,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub restored: usize,
    pub removed: usize,
    /// Unreadable start time, given a fresh full timer
    pub restarted: usize,
    pub skipped: usize,
}

struct TimerEntry {
    generation: u64,
    token: CancellationToken,
    target: Target,
    started_at: DateTime<FixedOffset>,
    deadline: DateTime<FixedOffset>,
    duration: Duration,
    warned: bool,
}

struct Inner {
    db: Arc<Mutex<Database>>,
    actions: ModerationActions,
    clock: Clock,
    settings: TimerSettings,
    timers: Mutex<HashMap<TimerKey, TimerEntry>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl Inner {
    /// Caller holds the table lock, so no timer can be scheduled in between
    async fn mark_deleted(&self, target: &Target) {
        let db = self.db.lock().await;
        if let Err(e) = db.mark_deleted(target.user_id, target.chat_id) {
            error!(user_id = target.user_id, chat_id = target.chat_id, "Failed to mark member deleted: {:#}", e);
        }
    }

    /// Mark deleted, then ban and announce; the record is deleted even if the ban fails
    async fn remove_member(&self, target: &Target) -> bool {
        {
            let mut timers = self.timers.lock().await;
            if let Some(entry) = timers.remove(&(target.user_id, target.chat_id)) {
                entry.token.cancel();
            }
            self.mark_deleted(target).await;
        }
        self.actions.remove(target).await
    }
}

#[derive(Clone)]
pub struct TimerManager {
    inner: Arc<Inner>,
}

impl TimerManager {
    pub fn new(db: Arc<Mutex<Database>>, actions: ModerationActions, clock: Clock, settings: TimerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                actions,
                clock,
                settings,
                timers: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> TimerSettings {
        self.inner.settings
    }

    /// Process start: rebuild timers from the store
    pub async fn init(&self) -> RecoveryReport {
        self.recover().await
    }

    /// Cancel every pending timer; nothing fires afterwards
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut timers = self.inner.timers.lock().await;
        let dropped = timers.len();
        timers.clear();
        info!("Timer manager stopped, {} pending timers dropped", dropped);
    }

    pub async fn start_full(&self, target: Target) -> StartOutcome {
        self.start(target, self.inner.settings.full_duration).await
    }

    pub async fn start(&self, target: Target, duration: Duration) -> StartOutcome {
        self.start_at(target, duration, self.inner.clock.now()).await
    }

    /// Start (or restart) a timer that began at `now` and persist its start
    pub async fn start_at(&self, target: Target, duration: Duration, now: DateTime<FixedOffset>) -> StartOutcome {
        let key = (target.user_id, target.chat_id);
        let mut timers = self.inner.timers.lock().await;
        let blocked = {
            let db = self.inner.db.lock().await;
            let blocked = match db.get_record(target.user_id, target.chat_id) {
                Ok(Some(record)) if record.is_deleted => Some(StartOutcome::Deleted),
                Ok(Some(record)) if record.exempt_from_removal => Some(StartOutcome::Exempt),
                Ok(Some(record)) if record.is_on_sick_leave() => Some(StartOutcome::OnSickLeave),
                Ok(_) => None,
                Err(e) => {
                    error!(user_id = target.user_id, chat_id = target.chat_id, "Failed to load member before timer start: {:#}", e);
                    None
                }
            };
            if blocked.is_none()
                && let Err(e) = db.set_timer(target.user_id, target.chat_id, Some(now), Some(duration))
            {
                error!(user_id = target.user_id, chat_id = target.chat_id, "Failed to persist timer start: {:#}", e);
            }
            blocked
        };
        if let Some(outcome) = blocked {
            if let Some(entry) = timers.remove(&key) {
                entry.token.cancel();
            }
            debug!(user_id = target.user_id, chat_id = target.chat_id, ?outcome, "Timer not scheduled");
            return outcome;
        }

        self.schedule_locked(&mut timers, target, now, now + span(duration), duration);
        StartOutcome::Scheduled
    }

    /// Schedule from a recovered remaining time without touching the stored start
    pub async fn restore_from_duration(&self, target: Target, remaining: Duration, original_started_at: DateTime<FixedOffset>) {
        let deadline = self.inner.clock.now() + span(remaining);
        let mut timers = self.inner.timers.lock().await;
        self.schedule_locked(&mut timers, target, original_started_at, deadline, remaining);
    }

    fn schedule_locked(
        &self,
        timers: &mut HashMap<TimerKey, TimerEntry>,
        target: Target,
        started_at: DateTime<FixedOffset>,
        deadline: DateTime<FixedOffset>,
        remaining: Duration,
    ) {
        let key = (target.user_id, target.chat_id);
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.inner.shutdown.child_token();
        let warn_after = warning_delay(remaining, self.inner.settings.warning_lead);

        info!(
            user_id = target.user_id,
            chat_id = target.chat_id,
            "Timer for {}: warning in {}s, removal in {}s",
            target.display_name,
            warn_after.as_secs(),
            remaining.as_secs()
        );

        let entry = TimerEntry {
            generation,
            token: token.clone(),
            target,
            started_at,
            deadline,
            duration: remaining,
            warned: false,
        };
        if let Some(previous) = timers.insert(key, entry) {
            previous.token.cancel();
        }
        tokio::spawn(warning_task(
            self.inner.clone(),
            key,
            generation,
            token.clone(),
            warn_after,
            remaining.saturating_sub(warn_after),
        ));
        tokio::spawn(removal_task(self.inner.clone(), key, generation, token, remaining));
    }

    /// Cancel in memory only. Returns whether a timer was running.
    pub async fn cancel(&self, user_id: i64, chat_id: i64) -> bool {
        let removed = self.inner.timers.lock().await.remove(&(user_id, chat_id));
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!(user_id, chat_id, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel and clear the persisted start
    pub async fn stop(&self, user_id: i64, chat_id: i64) -> bool {
        let was_running = self.cancel(user_id, chat_id).await;
        let db = self.inner.db.lock().await;
        if let Err(e) = db.set_timer(user_id, chat_id, None, None) {
            error!(user_id, chat_id, "Failed to clear persisted timer: {:#}", e);
        }
        was_running
    }

    /// Remove right away, skipping the countdown
    pub async fn remove_now(&self, target: &Target) -> bool {
        self.inner.remove_member(target).await
    }

    /// Freeze the time left until removal and pause the timer
    pub async fn enter_sick_leave(&self, user_id: i64, chat_id: i64, now: DateTime<FixedOffset>) -> SickLeaveStart {
        let record = {
            let db = self.inner.db.lock().await;
            match db.get_record(user_id, chat_id) {
                Ok(Some(record)) => record,
                Ok(None) => return SickLeaveStart::UnknownMember,
                Err(e) => {
                    error!(user_id, chat_id, "Failed to load member for sick leave: {:#}", e);
                    return SickLeaveStart::UnknownMember;
                }
            }
        };

        if let Some(leave) = record.sick_leave.as_ref().filter(|l| l.is_active()) {
            return SickLeaveStart::AlreadySick { frozen_remaining: leave.frozen_remaining };
        }

        let full = self.inner.settings.full_duration;
        let deadline = match self.snapshot(user_id, chat_id).await {
            Some(running) => running.deadline,
            None => match record.timer_started_at {
                Some(started_at) => started_at + span(record.timer_duration_or(full)),
                None => now + span(full),
            },
        };
        let frozen = frozen_remaining(deadline, now);

        self.cancel(user_id, chat_id).await;

        let mut leave = SickLeave::begin(now, frozen);
        if let Some(previous) = &record.sick_leave {
            leave.accumulated = previous.accumulated;
        }
        {
            let db = self.inner.db.lock().await;
            if let Err(e) = db.set_timer(user_id, chat_id, None, None) {
                error!(user_id, chat_id, "Failed to clear timer for sick leave: {:#}", e);
            }
            if let Err(e) = db.set_sick_leave(user_id, chat_id, Some(&leave)) {
                error!(user_id, chat_id, "Failed to persist sick leave: {:#}", e);
            }
        }

        info!(user_id, chat_id, "Sick leave started, {}s frozen", frozen.as_secs());
        SickLeaveStart::Started { frozen_remaining: frozen }
    }

    /// End the leave and resume with exactly the frozen remaining time
    pub async fn recover_from_sick_leave(&self, user_id: i64, chat_id: i64, now: DateTime<FixedOffset>) -> SickLeaveEnd {
        let record = {
            let db = self.inner.db.lock().await;
            match db.get_record(user_id, chat_id) {
                Ok(Some(record)) => record,
                Ok(None) => return SickLeaveEnd::UnknownMember,
                Err(e) => {
                    error!(user_id, chat_id, "Failed to load member for recovery: {:#}", e);
                    return SickLeaveEnd::UnknownMember;
                }
            }
        };
        let Some(mut leave) = record.sick_leave.clone().filter(SickLeave::is_active) else {
            return SickLeaveEnd::NotSick;
        };

        leave.finish(now);
        {
            let db = self.inner.db.lock().await;
            if let Err(e) = db.set_sick_leave(user_id, chat_id, Some(&leave)) {
                error!(user_id, chat_id, "Failed to persist recovery: {:#}", e);
            }
        }

        let target = Target::new(user_id, chat_id, record.display_name.clone());
        if leave.frozen_remaining.is_zero() && !record.exempt_from_removal {
            info!(user_id, chat_id, "Recovered with no time left, removing {}", target.display_name);
            self.remove_now(&target).await;
            return SickLeaveEnd::Removed;
        }

        let timer = self.start_at(target, leave.frozen_remaining, now).await;
        SickLeaveEnd::Resumed {
            remaining: leave.frozen_remaining,
            timer,
        }
    }

    /// Cold-start sweep over persisted timers
    pub async fn recover(&self) -> RecoveryReport {
        let now = self.inner.clock.now();
        let full = self.inner.settings.full_duration;
        let records = {
            let db = self.inner.db.lock().await;
            match db.list_records_with_timers() {
                Ok(records) => records,
                Err(e) => {
                    error!("Failed to load persisted timers: {:#}", e);
                    return RecoveryReport::default();
                }
            }
        };

        let mut report = RecoveryReport::default();
        for record in records {
            let target = Target::new(record.user_id, record.chat_id, record.display_name.clone());
            if record.exempt_from_removal || record.is_on_sick_leave() {
                report.skipped += 1;
                continue;
            }

            let Some(started_at) = record.timer_started_at else {
                warn!(user_id = record.user_id, chat_id = record.chat_id, "Unreadable timer start, starting a full timer");
                self.start_at(target, full, now).await;
                report.restarted += 1;
                continue;
            };

            match remaining_after(started_at, record.timer_duration_or(full), now) {
                Some(remaining) => {
                    self.restore_from_duration(target, remaining, started_at).await;
                    report.restored += 1;
                }
                None => {
                    info!(user_id = record.user_id, chat_id = record.chat_id, "Timer expired while offline");
                    self.remove_now(&target).await;
                    report.removed += 1;
                }
            }
        }

        info!(
            "Timer recovery: {} restored, {} removed, {} restarted, {} skipped",
            report.restored, report.removed, report.restarted, report.skipped
        );
        report
    }

    pub async fn snapshot(&self, user_id: i64, chat_id: i64) -> Option<TimerSnapshot> {
        let timers = self.inner.timers.lock().await;
        timers.get(&(user_id, chat_id)).map(|entry| TimerSnapshot {
            started_at: entry.started_at,
            deadline: entry.deadline,
            duration: entry.duration,
            state: if entry.warned { TimerState::Warned } else { TimerState::Running },
        })
    }

    pub async fn state(&self, user_id: i64, chat_id: i64) -> TimerState {
        self.snapshot(user_id, chat_id)
            .await
            .map_or(TimerState::Idle, |s| s.state)
    }

    pub async fn is_running(&self, user_id: i64, chat_id: i64) -> bool {
        self.inner.timers.lock().await.contains_key(&(user_id, chat_id))
    }

    pub async fn active_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }
}

async fn warning_task(inner: Arc<Inner>, key: TimerKey, generation: u64, token: CancellationToken, delay: Duration, remaining: Duration) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    let target = {
        let mut timers = inner.timers.lock().await;
        match timers.get_mut(&key) {
            Some(entry) if entry.generation == generation && !entry.token.is_cancelled() => {
                entry.warned = true;
                entry.target.clone()
            }
            _ => return,
        }
    };
    inner.actions.send_warning(&target, remaining).await;
}

async fn removal_task(inner: Arc<Inner>, key: TimerKey, generation: u64, token: CancellationToken, delay: Duration) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }

    let target = {
        let mut timers = inner.timers.lock().await;
        let live = timers
            .get(&key)
            .is_some_and(|entry| entry.generation == generation && !entry.token.is_cancelled());
        if !live {
            return;
        }
        let Some(entry) = timers.remove(&key) else {
            return;
        };
        // Deleted before the table unlocks: a start racing the ban sees it
        inner.mark_deleted(&entry.target).await;
        entry.target
    };
    inner.actions.remove(&target).await;
}

/// When to warn: `lead` before the end, or halfway if the timer is shorter than the lead
pub fn warning_delay(duration: Duration, lead: Duration) -> Duration {
    duration.checked_sub(lead).unwrap_or(duration / 2)
}

/// Time left on the clock when a sick leave starts at `sick_start`
pub fn frozen_remaining(deadline: DateTime<FixedOffset>, sick_start: DateTime<FixedOffset>) -> Duration {
    non_negative(deadline - sick_start)
}

/// Remaining time for a timer of `duration` started at `started_at`; `None` once expired
pub fn remaining_after(started_at: DateTime<FixedOffset>, duration: Duration, now: DateTime<FixedOffset>) -> Option<Duration> {
    let remaining = non_negative(started_at + span(duration) - now);
    (!remaining.is_zero()).then_some(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::moscow_tz;
    use crate::db::UserRecord;
    use crate::moderation::testing::{Event, RecordingModerator};
    use chrono::TimeZone;

    const CHAT: i64 = -100;
    const DAY: Duration = Duration::from_secs(86_400);

    struct Harness {
        timers: TimerManager,
        recorder: Arc<RecordingModerator>,
        db: Arc<Mutex<Database>>,
    }

    fn settings() -> TimerSettings {
        TimerSettings {
            full_duration: DAY * 7,
            warning_lead: DAY,
            ban_duration: DAY * 30,
        }
    }

    async fn harness(members: &[(i64, &str)]) -> Harness {
        let db = Database::open_in_memory().unwrap();
        for (user_id, name) in members {
            db.save_record(&UserRecord::new(*user_id, CHAT, *name)).unwrap();
        }
        let db = Arc::new(Mutex::new(db));
        let recorder = RecordingModerator::new();
        let actions = ModerationActions::new(recorder.clone(), settings().ban_duration);
        let timers = TimerManager::new(db.clone(), actions, Clock::default(), settings());
        Harness { timers, recorder, db }
    }

    fn t0() -> DateTime<FixedOffset> {
        moscow_tz().with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_warning_delay() {
        assert_eq!(warning_delay(DAY * 7, DAY), DAY * 6);
        assert_eq!(warning_delay(Duration::from_secs(10), DAY), Duration::from_secs(5));
        assert_eq!(warning_delay(DAY, DAY), Duration::ZERO);
    }

    #[test]
    fn test_frozen_remaining_floors_at_zero() {
        let deadline = t0() + span(DAY * 7);
        assert_eq!(frozen_remaining(deadline, t0() + span(DAY * 2)), DAY * 5);
        assert_eq!(frozen_remaining(deadline, t0() + span(DAY * 9)), Duration::ZERO);
    }

    #[test]
    fn test_remaining_after() {
        assert_eq!(remaining_after(t0(), DAY * 7, t0() + span(DAY * 2)), Some(DAY * 5));
        assert_eq!(remaining_after(t0(), DAY * 7, t0() + span(DAY * 7)), None);
        assert_eq!(remaining_after(t0(), DAY * 7, t0() + span(DAY * 8)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warns_then_removes() {
        let h = harness(&[(1, "@leo")]).await;
        assert_eq!(h.timers.start_full(Target::new(1, CHAT, "@leo")).await, StartOutcome::Scheduled);
        assert_eq!(h.timers.state(1, CHAT).await, TimerState::Running);

        tokio::time::sleep(DAY * 6 + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.timers.state(1, CHAT).await, TimerState::Warned);
        assert_eq!(h.recorder.messages().len(), 1);
        assert!(h.recorder.removals().is_empty());

        tokio::time::sleep(DAY).await;
        settle().await;
        let events = h.recorder.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], Event::Removed { chat_id: CHAT, user_id: 1, ban: DAY * 30 });
        assert_eq!(h.timers.state(1, CHAT).await, TimerState::Idle);

        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert!(record.is_deleted);
        assert_eq!(record.timer_started_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_persists_timer() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_at(Target::new(1, CHAT, "@leo"), DAY * 3, t0()).await;
        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert_eq!(record.timer_started_at, Some(t0()));
        assert_eq!(record.timer_duration, Some(DAY * 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_deadlines_fires_nothing() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_full(Target::new(1, CHAT, "@leo")).await;

        tokio::time::sleep(DAY * 2).await;
        assert!(h.timers.cancel(1, CHAT).await);
        assert!(!h.timers.cancel(1, CHAT).await);

        tokio::time::sleep(DAY * 10).await;
        settle().await;
        assert!(h.recorder.events().is_empty());
        assert!(!h.timers.is_running(1, CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_warning_prevents_removal() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_full(Target::new(1, CHAT, "@leo")).await;

        tokio::time::sleep(DAY * 6 + Duration::from_secs(60)).await;
        settle().await;
        assert!(h.timers.cancel(1, CHAT).await);

        tokio::time::sleep(DAY * 5).await;
        settle().await;
        assert_eq!(h.recorder.messages().len(), 1);
        assert!(h.recorder.removals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let h = harness(&[(1, "@leo")]).await;
        let target = Target::new(1, CHAT, "@leo");
        h.timers.start_full(target.clone()).await;

        tokio::time::sleep(DAY * 5).await;
        h.timers.start_full(target.clone()).await;
        assert_eq!(h.timers.active_count().await, 1);

        // First timer's deadline passes without effect
        tokio::time::sleep(DAY * 3).await;
        settle().await;
        assert!(h.recorder.events().is_empty());

        tokio::time::sleep(DAY * 5).await;
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exempt_member_never_scheduled() {
        let h = harness(&[(1, "@boss")]).await;
        h.db.lock().await.set_exempt(1, CHAT, true).unwrap();

        assert_eq!(h.timers.start_full(Target::new(1, CHAT, "@boss")).await, StartOutcome::Exempt);
        assert!(!h.timers.is_running(1, CHAT).await);

        tokio::time::sleep(DAY * 30).await;
        settle().await;
        assert!(h.recorder.events().is_empty());
        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert_eq!(record.timer_started_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_timer_warns_halfway() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start(Target::new(1, CHAT, "@leo"), Duration::from_secs(600)).await;

        tokio::time::sleep(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(h.timers.state(1, CHAT).await, TimerState::Warned);

        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sick_leave_round_trip_excludes_sick_time() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_at(Target::new(1, CHAT, "@leo"), DAY * 7, t0()).await;

        let sick_at = t0() + span(DAY * 2);
        assert_eq!(
            h.timers.enter_sick_leave(1, CHAT, sick_at).await,
            SickLeaveStart::Started { frozen_remaining: DAY * 5 }
        );
        assert!(!h.timers.is_running(1, CHAT).await);

        // Long illness: nothing fires
        tokio::time::sleep(DAY * 30).await;
        settle().await;
        assert!(h.recorder.events().is_empty());

        let healthy_at = sick_at + span(DAY * 30);
        assert_eq!(
            h.timers.recover_from_sick_leave(1, CHAT, healthy_at).await,
            SickLeaveEnd::Resumed { remaining: DAY * 5, timer: StartOutcome::Scheduled }
        );
        let snapshot = h.timers.snapshot(1, CHAT).await.unwrap();
        assert_eq!(snapshot.duration, DAY * 5);
        assert_eq!(snapshot.started_at, healthy_at);

        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        let leave = record.sick_leave.unwrap();
        assert_eq!(leave.ended_at, Some(healthy_at));
        assert_eq!(leave.accumulated, DAY * 30);

        tokio::time::sleep(DAY * 5 - Duration::from_secs(1)).await;
        settle().await;
        assert!(h.recorder.removals().is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_sick_leave_is_noop() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_at(Target::new(1, CHAT, "@leo"), DAY * 7, t0()).await;

        h.timers.enter_sick_leave(1, CHAT, t0() + span(DAY)).await;
        assert_eq!(
            h.timers.enter_sick_leave(1, CHAT, t0() + span(DAY * 3)).await,
            SickLeaveStart::AlreadySick { frozen_remaining: DAY * 6 }
        );
        assert_eq!(h.timers.recover_from_sick_leave(2, CHAT, t0()).await, SickLeaveEnd::UnknownMember);
        assert_eq!(h.timers.enter_sick_leave(2, CHAT, t0()).await, SickLeaveStart::UnknownMember);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_without_leave_is_noop() {
        let h = harness(&[(1, "@leo")]).await;
        assert_eq!(h.timers.recover_from_sick_leave(1, CHAT, t0()).await, SickLeaveEnd::NotSick);
        assert!(h.recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sick_after_deadline_removes_on_recovery() {
        let h = harness(&[(1, "@leo")]).await;
        h.timers.start_at(Target::new(1, CHAT, "@leo"), DAY * 7, t0()).await;

        let sick_at = t0() + span(DAY * 8);
        assert_eq!(
            h.timers.enter_sick_leave(1, CHAT, sick_at).await,
            SickLeaveStart::Started { frozen_remaining: Duration::ZERO }
        );
        assert_eq!(h.timers.recover_from_sick_leave(1, CHAT, sick_at + span(DAY)).await, SickLeaveEnd::Removed);
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
        assert!(h.db.lock().await.get_record(1, CHAT).unwrap().unwrap().is_deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_sweep() {
        let h = harness(&[(1, "@fresh"), (2, "@expired"), (3, "@boss"), (4, "@broken"), (5, "@sick")]).await;
        let now = Clock::default().now();
        let fresh_start = now - span(DAY * 2);
        {
            let db = h.db.lock().await;
            db.set_timer(1, CHAT, Some(fresh_start), None).unwrap();
            db.set_timer(2, CHAT, Some(now - span(DAY * 8)), None).unwrap();

            let mut boss = db.get_record(3, CHAT).unwrap().unwrap();
            boss.exempt_from_removal = true;
            boss.timer_started_at = Some(now - span(DAY * 9));
            db.save_record(&boss).unwrap();

            db.conn()
                .execute("UPDATE members SET timer_started_at = '1m30s' WHERE user_id = 4", [])
                .unwrap();

            db.set_timer(5, CHAT, Some(now - span(DAY * 9)), None).unwrap();
            db.set_sick_leave(5, CHAT, Some(&SickLeave::begin(now - span(DAY), DAY))).unwrap();
        }

        let report = h.timers.init().await;
        assert_eq!(report, RecoveryReport { restored: 1, removed: 1, restarted: 1, skipped: 2 });
        assert_eq!(h.recorder.removals(), vec![(CHAT, 2)]);
        assert!(h.timers.is_running(1, CHAT).await);
        assert!(h.timers.is_running(4, CHAT).await);
        assert!(!h.timers.is_running(3, CHAT).await);
        assert!(!h.timers.is_running(5, CHAT).await);

        let db_fresh = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert_eq!(db_fresh.timer_started_at, Some(fresh_start));
        let broken = h.db.lock().await.get_record(4, CHAT).unwrap().unwrap();
        assert!(broken.timer_started_at.is_some());

        // Restored timer keeps its original deadline
        tokio::time::sleep(DAY * 5 + Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 2), (CHAT, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let h = harness(&[(1, "@a"), (2, "@b")]).await;
        h.timers.start_full(Target::new(1, CHAT, "@a")).await;
        h.timers.start_full(Target::new(2, CHAT, "@b")).await;
        assert_eq!(h.timers.active_count().await, 2);

        h.timers.shutdown().await;
        assert_eq!(h.timers.active_count().await, 0);

        tokio::time::sleep(DAY * 10).await;
        settle().await;
        assert!(h.recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ban_still_marks_deleted() {
        let h = harness(&[(1, "@leo")]).await;
        h.recorder.fail_removals();
        h.timers.start(Target::new(1, CHAT, "@leo"), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert!(h.db.lock().await.get_record(1, CHAT).unwrap().unwrap().is_deleted);
        assert!(!h.timers.is_running(1, CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_slow_ban_sees_deleted_member() {
        let h = harness(&[(1, "@leo")]).await;
        let gate = h.recorder.hold_removals();
        let target = Target::new(1, CHAT, "@leo");
        h.timers.start(target.clone(), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert!(h.recorder.removals().is_empty());
        assert!(h.db.lock().await.get_record(1, CHAT).unwrap().unwrap().is_deleted);

        assert_eq!(h.timers.start_full(target).await, StartOutcome::Deleted);
        assert!(!h.timers.is_running(1, CHAT).await);

        gate.add_permits(1);
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);

        tokio::time::sleep(DAY * 8).await;
        settle().await;
        assert_eq!(h.recorder.removals(), vec![(CHAT, 1)]);
        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert!(record.is_deleted);
        assert_eq!(record.timer_started_at, None);

        // A restart after the removal finds nothing to restore
        h.timers.shutdown().await;
        let recorder = RecordingModerator::new();
        let restarted = TimerManager::new(
            h.db.clone(),
            ModerationActions::new(recorder.clone(), settings().ban_duration),
            Clock::default(),
            settings(),
        );
        assert_eq!(restarted.init().await, RecoveryReport::default());
        assert_eq!(restarted.active_count().await, 0);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_keeps_sick_time_excluded() {
        let h = harness(&[(1, "@leo")]).await;
        let now = Clock::default().now();
        let target = Target::new(1, CHAT, "@leo");

        // Full week started four days ago, one day of it used before falling ill
        h.timers.start_at(target, DAY * 7, now - span(DAY * 4)).await;
        assert_eq!(
            h.timers.enter_sick_leave(1, CHAT, now - span(DAY * 3)).await,
            SickLeaveStart::Started { frozen_remaining: DAY * 6 }
        );
        let healthy_at = now - span(DAY * 2);
        assert_eq!(
            h.timers.recover_from_sick_leave(1, CHAT, healthy_at).await,
            SickLeaveEnd::Resumed { remaining: DAY * 6, timer: StartOutcome::Scheduled }
        );
        let record = h.db.lock().await.get_record(1, CHAT).unwrap().unwrap();
        assert_eq!(record.timer_started_at, Some(healthy_at));
        assert_eq!(record.timer_duration, Some(DAY * 6));

        // Process restart two days after recovering
        h.timers.shutdown().await;
        let recorder = RecordingModerator::new();
        let restarted = TimerManager::new(
            h.db.clone(),
            ModerationActions::new(recorder.clone(), settings().ban_duration),
            Clock::default(),
            settings(),
        );
        assert_eq!(restarted.init().await, RecoveryReport { restored: 1, ..Default::default() });

        let snapshot = restarted.snapshot(1, CHAT).await.unwrap();
        assert_eq!(snapshot.started_at, healthy_at);
        assert!(snapshot.duration <= DAY * 4);
        assert!(snapshot.duration > DAY * 4 - Duration::from_secs(5));

        tokio::time::sleep(DAY * 4 - Duration::from_secs(10)).await;
        settle().await;
        assert!(recorder.removals().is_empty());
        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(recorder.removals(), vec![(CHAT, 1)]);
        assert!(h.recorder.removals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_member_not_scheduled() {
        let h = harness(&[(1, "@gone")]).await;
        h.db.lock().await.mark_deleted(1, CHAT).unwrap();
        assert_eq!(h.timers.start_full(Target::new(1, CHAT, "@gone")).await, StartOutcome::Deleted);
        assert_eq!(h.timers.active_count().await, 0);
    }
}
