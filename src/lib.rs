//! fatleopard - Telegram group coach
//!
//! Members report trainings with hashtags, earn calories and cups for
//! streaks, and get removed from the chat after a week of silence.

pub mod bot;
pub mod clock;
pub mod coach;
pub mod config;
pub mod db;
pub mod exchange;
pub mod messages;
pub mod moderation;
pub mod phrases;
pub mod rewards;
pub mod timers;
pub mod tui;

pub use config::Settings;
pub use db::Database;
