//! Moderation actions
//!
//! The timer manager and the coach never talk to Telegram directly; they go
//! through [`Moderator`], which the bot implements with real API calls and
//! tests implement with a recorder.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::messages;

/// Messaging collaborator
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Ban `user_id` from `chat_id` for `ban`
    async fn remove_member(&self, chat_id: i64, user_id: i64, ban: Duration) -> Result<()>;

    async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool;
}

/// Who a timer or action is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: String,
}

impl Target {
    pub fn new(user_id: i64, chat_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            display_name: display_name.into(),
        }
    }
}

/// Side effects invoked when timers fire. Failures are logged, never returned.
#[derive(Clone)]
pub struct ModerationActions {
    moderator: Arc<dyn Moderator>,
    ban_duration: Duration,
}

impl ModerationActions {
    pub fn new(moderator: Arc<dyn Moderator>, ban_duration: Duration) -> Self {
        Self { moderator, ban_duration }
    }

    /// Best-effort message; returns whether it was delivered
    pub async fn notify(&self, chat_id: i64, text: &str) -> bool {
        match self.moderator.send_message(chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                error!(chat_id, "Failed to send message: {:#}", e);
                false
            }
        }
    }

    pub async fn send_warning(&self, target: &Target, remaining: Duration) {
        info!(user_id = target.user_id, chat_id = target.chat_id, "Sending removal warning to {}", target.display_name);
        self.notify(target.chat_id, &messages::warning(&target.display_name, remaining)).await;
    }

    /// Ban the member and announce it. Returns whether the ban went through.
    pub async fn remove(&self, target: &Target) -> bool {
        match self
            .moderator
            .remove_member(target.chat_id, target.user_id, self.ban_duration)
            .await
        {
            Ok(()) => {
                info!(user_id = target.user_id, chat_id = target.chat_id, "Removed {} for inactivity", target.display_name);
                self.notify(target.chat_id, &messages::removed(&target.display_name)).await;
                true
            }
            Err(e) => {
                error!(user_id = target.user_id, chat_id = target.chat_id, "Failed to remove {}: {:#}", target.display_name, e);
                self.notify(target.chat_id, &messages::removal_failed(&target.display_name)).await;
                false
            }
        }
    }

    pub async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        self.moderator.is_admin(chat_id, user_id).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Event, RecordingModerator};
    use super::*;

    #[tokio::test]
    async fn test_remove_bans_and_announces() {
        let recorder = RecordingModerator::new();
        let actions = ModerationActions::new(recorder.clone(), Duration::from_secs(60));

        assert!(actions.remove(&Target::new(5, -100, "@lazy")).await);

        let events = recorder.events();
        assert_eq!(events[0], Event::Removed { chat_id: -100, user_id: 5, ban: Duration::from_secs(60) });
        assert!(matches!(&events[1], Event::Message { chat_id: -100, text } if text.contains("@lazy")));
    }

    #[tokio::test]
    async fn test_failed_removal_still_notifies() {
        let recorder = RecordingModerator::new();
        recorder.fail_removals();
        let actions = ModerationActions::new(recorder.clone(), Duration::from_secs(60));

        assert!(!actions.remove(&Target::new(5, -100, "@lazy")).await);
        assert!(recorder.removals().is_empty());
        assert_eq!(recorder.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_warning_mentions_member() {
        let recorder = RecordingModerator::new();
        let actions = ModerationActions::new(recorder.clone(), Duration::from_secs(60));
        actions.send_warning(&Target::new(5, -100, "@slow"), Duration::from_secs(86400)).await;
        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("@slow"));
    }
}
