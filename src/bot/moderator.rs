//! Telegram implementation of the moderation collaborator

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::warn;

use crate::clock::span;
use crate::moderation::Moderator;

pub struct TelegramModerator {
    bot: Bot,
}

impl TelegramModerator {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn user_id(raw: i64) -> Result<UserId> {
    let id = u64::try_from(raw).with_context(|| format!("invalid user id {}", raw))?;
    Ok(UserId(id))
}

#[async_trait]
impl Moderator for TelegramModerator {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }

    async fn remove_member(&self, chat_id: i64, user: i64, ban: Duration) -> Result<()> {
        let until = Utc::now() + span(ban);
        self.bot
            .ban_chat_member(ChatId(chat_id), user_id(user)?)
            .until_date(until)
            .await
            .with_context(|| format!("ban {} in chat {}", user, chat_id))?;
        Ok(())
    }

    async fn is_admin(&self, chat_id: i64, user: i64) -> bool {
        let Ok(id) = user_id(user) else {
            return false;
        };
        match self.bot.get_chat_member(ChatId(chat_id), id).await {
            Ok(member) => member.is_privileged(),
            Err(e) => {
                warn!(chat_id, user_id = user, "Failed to check admin rights: {}", e);
                false
            }
        }
    }
}
