//! Database module - SQLite storage for chat members
//!
//! One row per (user, chat). Counters (calories, cups) are changed with
//! in-place increments so concurrent handlers for the same member don't lose
//! updates; everything else is last-writer-wins.

mod record;

pub use record::{SickLeave, UserRecord, display_name};

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::warn;

use crate::clock::Clock;
use crate::config::ExchangeTerms;
use crate::exchange::{ExchangeOutcome, plan_exchange};

const DATE_FORMAT: &str = "%Y-%m-%d";

const MEMBER_COLUMNS: &str = "user_id, chat_id, display_name, calories, cups, streak_days, \
    calorie_streak_days, last_training_date, last_message_at, timer_started_at, timer_duration_secs, \
    sick_started_at, sick_ended_at, sick_accumulated_secs, sick_frozen_remaining_secs, is_exempt, is_deleted";

/// Aggregate numbers for the `/db` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: i64,
    pub active: i64,
    pub deleted: i64,
    pub on_sick_leave: i64,
    pub exempt: i64,
    pub with_timers: i64,
    pub trainings: i64,
}

/// Database wrapper. Instants are written and read back in the clock's offset.
pub struct Database {
    conn: Connection,
    clock: Clock,
}

impl Database {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn, clock: Clock::default() };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, clock: Clock::default() };
        db.init_schema()?;
        Ok(db)
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn stamp(&self) -> String {
        self.clock.format(self.clock.now())
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS members (
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                display_name TEXT NOT NULL DEFAULT '',
                calories INTEGER NOT NULL DEFAULT 0,
                streak_days INTEGER NOT NULL DEFAULT 0,
                last_training_date TEXT,
                last_message_at TEXT,
                timer_started_at TEXT,
                sick_started_at TEXT,
                sick_ended_at TEXT,
                sick_accumulated_secs INTEGER,
                sick_frozen_remaining_secs INTEGER,
                is_exempt INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, chat_id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS training_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                display_name TEXT NOT NULL,
                reported_at TEXT NOT NULL
            )",
            [],
        )?;

        // Migration: columns added after the first release
        for (column, ddl) in [
            ("cups", "ALTER TABLE members ADD COLUMN cups INTEGER NOT NULL DEFAULT 0"),
            ("calorie_streak_days", "ALTER TABLE members ADD COLUMN calorie_streak_days INTEGER NOT NULL DEFAULT 0"),
            ("timer_duration_secs", "ALTER TABLE members ADD COLUMN timer_duration_secs INTEGER"),
        ] {
            let has_column = self.conn
                .prepare(&format!("SELECT {} FROM members LIMIT 1", column))
                .is_ok();
            if !has_column {
                self.conn.execute(ddl, [])?;
            }
        }

        Ok(())
    }

    pub fn get_record(&self, user_id: i64, chat_id: i64) -> Result<Option<UserRecord>> {
        let record = self.conn
            .query_row(
                &format!("SELECT {} FROM members WHERE user_id = ?1 AND chat_id = ?2", MEMBER_COLUMNS),
                params![user_id, chat_id],
                |row| record_from_row(&self.clock, row),
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or fully overwrite a record
    pub fn save_record(&self, record: &UserRecord) -> Result<()> {
        let now = self.stamp();
        let sick = record.sick_leave.as_ref();
        self.conn.execute(
            "INSERT INTO members (user_id, chat_id, display_name, calories, cups, streak_days, calorie_streak_days,
                last_training_date, last_message_at, timer_started_at, timer_duration_secs,
                sick_started_at, sick_ended_at, sick_accumulated_secs, sick_frozen_remaining_secs,
                is_exempt, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
             ON CONFLICT (user_id, chat_id) DO UPDATE SET
                display_name = excluded.display_name,
                calories = excluded.calories,
                cups = excluded.cups,
                streak_days = excluded.streak_days,
                calorie_streak_days = excluded.calorie_streak_days,
                last_training_date = excluded.last_training_date,
                last_message_at = excluded.last_message_at,
                timer_started_at = excluded.timer_started_at,
                timer_duration_secs = excluded.timer_duration_secs,
                sick_started_at = excluded.sick_started_at,
                sick_ended_at = excluded.sick_ended_at,
                sick_accumulated_secs = excluded.sick_accumulated_secs,
                sick_frozen_remaining_secs = excluded.sick_frozen_remaining_secs,
                is_exempt = excluded.is_exempt,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at",
            params![
                record.user_id,
                record.chat_id,
                record.display_name,
                record.calories,
                record.cups,
                record.streak_days,
                record.calorie_streak_days,
                record.last_training_date.map(|d| d.format(DATE_FORMAT).to_string()),
                record.last_message_at.map(|t| self.clock.format(t)),
                record.timer_started_at.map(|t| self.clock.format(t)),
                record.timer_duration.map(secs),
                sick.map(|s| self.clock.format(s.started_at)),
                sick.and_then(|s| s.ended_at).map(|t| self.clock.format(t)),
                sick.map(|s| secs(s.accumulated)),
                sick.map(|s| secs(s.frozen_remaining)),
                record.exempt_from_removal,
                record.is_deleted,
                now,
            ],
        )?;
        Ok(())
    }

    /// Non-deleted members of a chat, best first
    pub fn list_active_records(&self, chat_id: i64) -> Result<Vec<UserRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM members WHERE chat_id = ?1 AND is_deleted = 0 ORDER BY calories DESC, cups DESC, user_id",
                MEMBER_COLUMNS
            ),
            params![chat_id],
        )
    }

    /// Every non-deleted record with a persisted timer, across all chats
    pub fn list_records_with_timers(&self) -> Result<Vec<UserRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM members WHERE timer_started_at IS NOT NULL AND is_deleted = 0 ORDER BY chat_id, user_id",
                MEMBER_COLUMNS
            ),
            [],
        )
    }

    pub fn list_all(&self) -> Result<Vec<UserRecord>> {
        self.query_records(
            &format!("SELECT {} FROM members ORDER BY chat_id, calories DESC, user_id", MEMBER_COLUMNS),
            [],
        )
    }

    pub fn top_by_calories(&self, chat_id: i64, limit: usize) -> Result<Vec<UserRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM members WHERE chat_id = ?1 AND is_deleted = 0 AND calories > 0
                 ORDER BY calories DESC, cups DESC, user_id LIMIT ?2",
                MEMBER_COLUMNS
            ),
            params![chat_id, limit as i64],
        )
    }

    /// Look up a member by `@handle`, bare handle, full display name or numeric id
    pub fn find_by_name(&self, chat_id: i64, name: &str) -> Result<Option<UserRecord>> {
        let bare = name.trim().trim_start_matches('@');
        if bare.is_empty() {
            return Ok(None);
        }
        if let Ok(user_id) = bare.parse::<i64>() {
            if let Some(record) = self.get_record(user_id, chat_id)? {
                return Ok(Some(record));
            }
        }
        let record = self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM members WHERE chat_id = ?1
                     AND (lower(display_name) = lower(?2) OR lower(display_name) = lower(?3))
                     ORDER BY is_deleted, user_id LIMIT 1",
                    MEMBER_COLUMNS
                ),
                params![chat_id, format!("@{}", bare), bare],
                |row| record_from_row(&self.clock, row),
            )
            .optional()?;
        Ok(record)
    }

    /// Refresh name and last-seen time; revives a deleted record
    pub fn update_presence(&self, user_id: i64, chat_id: i64, display_name: &str, seen_at: DateTime<FixedOffset>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE members SET display_name = ?3, last_message_at = ?4, is_deleted = 0, updated_at = ?5
             WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id, display_name, self.clock.format(seen_at), self.stamp()],
        )?;
        Ok(changed > 0)
    }

    /// Atomically add (or subtract) calories, returning the new balance
    pub fn add_calories(&self, user_id: i64, chat_id: i64, delta: i64) -> Result<Option<i64>> {
        self.increment("calories", user_id, chat_id, delta)
    }

    /// Atomically add cups, returning the new total
    pub fn add_cups(&self, user_id: i64, chat_id: i64, delta: i64) -> Result<Option<i64>> {
        self.increment("cups", user_id, chat_id, delta)
    }

    fn increment(&self, column: &str, user_id: i64, chat_id: i64, delta: i64) -> Result<Option<i64>> {
        let value = self.conn
            .query_row(
                &format!(
                    "UPDATE members SET {column} = {column} + ?3, updated_at = ?4
                     WHERE user_id = ?1 AND chat_id = ?2 RETURNING {column}"
                ),
                params![user_id, chat_id, delta, self.stamp()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn update_streak(&self, user_id: i64, chat_id: i64, streak_days: u32, calorie_streak_days: u32, date: NaiveDate) -> Result<()> {
        self.conn.execute(
            "UPDATE members SET streak_days = ?3, calorie_streak_days = ?4, last_training_date = ?5, updated_at = ?6
             WHERE user_id = ?1 AND chat_id = ?2",
            params![
                user_id,
                chat_id,
                streak_days,
                calorie_streak_days,
                date.format(DATE_FORMAT).to_string(),
                self.stamp()
            ],
        )?;
        Ok(())
    }

    /// Persist (or clear, with `None`) the running timer
    pub fn set_timer(&self, user_id: i64, chat_id: i64, started_at: Option<DateTime<FixedOffset>>, duration: Option<Duration>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE members SET timer_started_at = ?3, timer_duration_secs = ?4, updated_at = ?5
             WHERE user_id = ?1 AND chat_id = ?2",
            params![
                user_id,
                chat_id,
                started_at.map(|t| self.clock.format(t)),
                duration.map(secs),
                self.stamp()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_sick_leave(&self, user_id: i64, chat_id: i64, sick_leave: Option<&SickLeave>) -> Result<()> {
        self.conn.execute(
            "UPDATE members SET sick_started_at = ?3, sick_ended_at = ?4, sick_accumulated_secs = ?5,
                sick_frozen_remaining_secs = ?6, updated_at = ?7
             WHERE user_id = ?1 AND chat_id = ?2",
            params![
                user_id,
                chat_id,
                sick_leave.map(|s| self.clock.format(s.started_at)),
                sick_leave.and_then(|s| s.ended_at).map(|t| self.clock.format(t)),
                sick_leave.map(|s| secs(s.accumulated)),
                sick_leave.map(|s| secs(s.frozen_remaining)),
                self.stamp()
            ],
        )?;
        Ok(())
    }

    /// Exempt members never keep a persisted timer
    pub fn set_exempt(&self, user_id: i64, chat_id: i64, exempt: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE members SET is_exempt = ?3,
                timer_started_at = CASE WHEN ?3 THEN NULL ELSE timer_started_at END,
                timer_duration_secs = CASE WHEN ?3 THEN NULL ELSE timer_duration_secs END,
                updated_at = ?4
             WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id, exempt, self.stamp()],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_deleted(&self, user_id: i64, chat_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE members SET is_deleted = 1, timer_started_at = NULL, timer_duration_secs = NULL, updated_at = ?3
             WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id, self.stamp()],
        )?;
        Ok(())
    }

    /// Spend whole exchange units in one transaction; `None` for unknown members
    pub fn apply_exchange(&self, user_id: i64, chat_id: i64, terms: &ExchangeTerms) -> Result<Option<ExchangeOutcome>> {
        let tx = self.conn.unchecked_transaction()?;
        let balances: Option<(i64, i64)> = tx
            .query_row(
                "SELECT calories, cups FROM members WHERE user_id = ?1 AND chat_id = ?2",
                params![user_id, chat_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((calories, cups)) = balances else {
            return Ok(None);
        };

        let outcome = plan_exchange(calories, cups, terms);
        if !outcome.is_insufficient() {
            tx.execute(
                "UPDATE members SET calories = calories - ?3, cups = cups + ?4, calorie_streak_days = 0, updated_at = ?5
                 WHERE user_id = ?1 AND chat_id = ?2",
                params![user_id, chat_id, outcome.calories_spent, outcome.cups_gained, self.stamp()],
            )?;
        }
        tx.commit()?;
        Ok(Some(outcome))
    }

    pub fn log_training(&self, user_id: i64, chat_id: i64, display_name: &str, reported_at: DateTime<FixedOffset>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO training_log (user_id, chat_id, display_name, reported_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, chat_id, display_name, self.clock.format(reported_at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_trainings(&self, user_id: i64, chat_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM training_log WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(is_deleted = 0), 0),
                COALESCE(SUM(is_deleted = 1), 0),
                COALESCE(SUM(sick_started_at IS NOT NULL AND sick_ended_at IS NULL AND is_deleted = 0), 0),
                COALESCE(SUM(is_exempt = 1), 0),
                COALESCE(SUM(timer_started_at IS NOT NULL), 0)
             FROM members",
            [],
            |row| {
                Ok(StoreStats {
                    total: row.get(0)?,
                    active: row.get(1)?,
                    deleted: row.get(2)?,
                    on_sick_leave: row.get(3)?,
                    exempt: row.get(4)?,
                    with_timers: row.get(5)?,
                    trainings: 0,
                })
            },
        )?;
        stats.trainings = self.conn.query_row("SELECT COUNT(*) FROM training_log", [], |row| row.get(0))?;
        Ok(stats)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn query_records(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<UserRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, |row| record_from_row(&self.clock, row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn duration_from_secs(raw: Option<i64>) -> Option<Duration> {
    raw.map(|s| Duration::from_secs(s.max(0).unsigned_abs()))
}

/// Unparseable timestamps are treated as absent
fn parse_timestamp(clock: &Clock, user_id: i64, column: &str, raw: Option<String>) -> Option<DateTime<FixedOffset>> {
    let raw = raw?;
    match clock.parse(&raw) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(user_id, column, "Malformed timestamp ignored: {:#}", e);
            None
        }
    }
}

fn parse_date(user_id: i64, raw: Option<String>) -> Option<NaiveDate> {
    let raw = raw?;
    match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(user_id, value = %raw, "Malformed training date ignored: {}", e);
            None
        }
    }
}

fn record_from_row(clock: &Clock, row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let user_id: i64 = row.get(0)?;

    let sick_started_at = parse_timestamp(clock, user_id, "sick_started_at", row.get(11)?);
    let sick_ended_at = parse_timestamp(clock, user_id, "sick_ended_at", row.get(12)?);
    let sick_accumulated = duration_from_secs(row.get(13)?).unwrap_or_default();
    let sick_frozen = duration_from_secs(row.get(14)?).unwrap_or_default();
    let sick_leave = sick_started_at.map(|started_at| SickLeave {
        started_at,
        ended_at: sick_ended_at,
        accumulated: sick_accumulated,
        frozen_remaining: sick_frozen,
    });

    Ok(UserRecord {
        user_id,
        chat_id: row.get(1)?,
        display_name: row.get(2)?,
        calories: row.get(3)?,
        cups: row.get(4)?,
        streak_days: row.get(5)?,
        calorie_streak_days: row.get(6)?,
        last_training_date: parse_date(user_id, row.get(7)?),
        last_message_at: parse_timestamp(clock, user_id, "last_message_at", row.get(8)?),
        timer_started_at: parse_timestamp(clock, user_id, "timer_started_at", row.get(9)?),
        timer_duration: duration_from_secs(row.get(10)?),
        sick_leave,
        exempt_from_removal: row.get(15)?,
        is_deleted: row.get(16)?,
    })
}
