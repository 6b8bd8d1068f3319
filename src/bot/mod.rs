//! Telegram bot module - chat moderation by training reports

mod moderator;

pub use moderator::TelegramModerator;

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{ChatId, Me, User},
    utils::command::BotCommands,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::coach::Coach;
use crate::config::Settings;
use crate::db::{Database, display_name};
use crate::messages;
use crate::moderation::{ModerationActions, Moderator, Target};
use crate::timers::TimerManager;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "snake_case", description = "Команды бота:")]
pub enum Command {
    #[command(description = "Приветствие и правила")]
    Start,
    #[command(description = "Показать помощь")]
    Help,
    #[command(description = "Топ по калориям")]
    Top,
    #[command(description = "Мои калории")]
    Points,
    #[command(description = "Мои кубки")]
    Cups,
    #[command(description = "Запустить таймеры всем (админ)")]
    StartTimer,
    #[command(description = "Статистика базы (админ)")]
    Db,
    #[command(description = "Исключить из удаления: /set_exempt @user (админ)")]
    SetExempt(String),
    #[command(description = "Вернуть под правило удаления: /remove_exempt @user (админ)")]
    RemoveExempt(String),
    #[command(description = "Список участников (админ)")]
    ListUsers,
    #[command(description = "Отправить сообщение в чат: /send_to_chat <chat_id> <текст> (владелец)")]
    SendToChat(String),
}

impl Command {
    fn admin_only(&self) -> bool {
        matches!(
            self,
            Command::StartTimer | Command::Db | Command::SetExempt(_) | Command::RemoveExempt(_) | Command::ListUsers
        )
    }
}

/// Hashtags the bot reacts to, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hashtag {
    TrainingDone,
    SickLeave,
    Healthy,
    Change,
}

impl Hashtag {
    const ALL: [Hashtag; 4] = [Hashtag::TrainingDone, Hashtag::SickLeave, Hashtag::Healthy, Hashtag::Change];

    pub fn tag(&self) -> &'static str {
        match self {
            Hashtag::TrainingDone => "#training_done",
            Hashtag::SickLeave => "#sick_leave",
            Hashtag::Healthy => "#healthy",
            Hashtag::Change => "#change",
        }
    }

    /// First matching hashtag by priority, case-insensitive
    pub fn detect(text: &str) -> Option<Hashtag> {
        let lower = text.to_lowercase();
        Hashtag::ALL.into_iter().find(|h| lower.contains(h.tag()))
    }
}

fn target_of(chat_id: ChatId, user: &User) -> Target {
    let user_id = user.id.0 as i64;
    Target::new(
        user_id,
        chat_id.0,
        display_name(user_id, user.username.as_deref(), &user.first_name, user.last_name.as_deref()),
    )
}

/// `<chat_id> <text>`
fn parse_send_to_chat(args: &str) -> Option<(i64, &str)> {
    let (chat, text) = args.trim().split_once(char::is_whitespace)?;
    let chat_id = chat.parse().ok()?;
    let text = text.trim();
    (!text.is_empty()).then_some((chat_id, text))
}

/// Start the Telegram bot: recover timers, then dispatch until Ctrl-C
pub async fn run_bot(token: String, settings: Settings) -> anyhow::Result<()> {
    let bot = Bot::new(token);
    let clock = Clock::new(settings.reference_tz);
    let db = Arc::new(Mutex::new(Database::open(&settings.db_path)?.with_clock(clock)));

    let moderator: Arc<dyn Moderator> = Arc::new(TelegramModerator::new(bot.clone()));
    let actions = ModerationActions::new(moderator, settings.timers.ban_duration);
    let timers = TimerManager::new(db.clone(), actions.clone(), clock, settings.timers);

    let report = timers.init().await;
    info!(
        "Recovered timers: {} restored, {} removed, {} restarted",
        report.restored, report.removed, report.restarted
    );

    let coach = Arc::new(Coach::new(db, timers.clone(), actions, clock, settings));

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_map(|msg: Message| msg.new_chat_members().map(|users| users.to_vec()))
                .endpoint(handle_new_members),
        )
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            Update::filter_message()
                .endpoint(handle_message),
        );

    info!("Bot started");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![coach])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    timers.shutdown().await;
    Ok(())
}

fn is_group(msg: &Message) -> bool {
    msg.chat.is_group() || msg.chat.is_supergroup()
}

async fn handle_new_members(msg: Message, users: Vec<User>, me: Me, coach: Arc<Coach>) -> HandlerResult {
    for user in users {
        if user.id == me.id {
            // Bot added to a chat: pick up everyone already known there
            let (started, _) = coach.start_all_timers(msg.chat.id.0).await;
            info!(chat_id = msg.chat.id.0, "Added to chat, {} timers started", started);
            continue;
        }
        if user.is_bot {
            continue;
        }
        coach.member_joined(&target_of(msg.chat.id, &user)).await;
    }
    Ok(())
}

async fn handle_command(bot: Bot, msg: Message, cmd: Command, coach: Arc<Coach>) -> HandlerResult {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let who = target_of(msg.chat.id, from);
    let chat_id = msg.chat.id.0;

    if is_group(&msg) && !from.is_bot {
        coach.observe_message(&who).await;
    }

    if cmd.admin_only() && !coach.is_admin(chat_id, who.user_id).await {
        bot.send_message(msg.chat.id, messages::admin_only()).await?;
        return Ok(());
    }

    let settings = coach.settings();
    let timers = coach.timers().settings();
    let reply = match cmd {
        Command::Start => messages::start(&settings.rewards, &settings.exchange, timers.full_duration, timers.warning_lead),
        Command::Help => messages::help(
            &Command::descriptions().to_string(),
            &settings.rewards,
            &settings.exchange,
            timers.full_duration,
            timers.warning_lead,
        ),
        Command::Top => coach.leaderboard(chat_id).await,
        Command::Points => coach.points(&who).await,
        Command::Cups => coach.cups(&who).await,
        Command::StartTimer => {
            let (started, skipped) = coach.start_all_timers(chat_id).await;
            messages::timers_started(started, skipped)
        }
        Command::Db => coach.stats().await,
        Command::SetExempt(name) if name.trim().is_empty() => messages::usage("/set_exempt @username"),
        Command::SetExempt(name) => coach.set_exempt(chat_id, name.trim()).await,
        Command::RemoveExempt(name) if name.trim().is_empty() => messages::usage("/remove_exempt @username"),
        Command::RemoveExempt(name) => coach.remove_exempt(chat_id, name.trim()).await,
        Command::ListUsers => coach.list_users(chat_id).await,
        Command::SendToChat(args) => {
            if !coach.is_owner(who.user_id) {
                messages::owner_only()
            } else {
                match parse_send_to_chat(&args) {
                    Some((target_chat, text)) if coach.send_to_chat(target_chat, text).await => {
                        format!("✅ Отправлено в чат {}", target_chat)
                    }
                    Some((target_chat, _)) => format!("❌ Не удалось отправить в чат {}", target_chat),
                    None => messages::usage("/send_to_chat <chat_id> <текст>"),
                }
            }
        }
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_message(msg: Message, coach: Arc<Coach>) -> HandlerResult {
    if !is_group(&msg) {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    if from.is_bot {
        return Ok(());
    }

    let who = target_of(msg.chat.id, from);
    coach.observe_message(&who).await;

    let Some(tag) = msg.text().or_else(|| msg.caption()).and_then(Hashtag::detect) else {
        return Ok(());
    };
    info!(user_id = who.user_id, chat_id = who.chat_id, "{} from {}", tag.tag(), who.display_name);

    match tag {
        Hashtag::TrainingDone => {
            coach.training_report(&who).await;
        }
        Hashtag::SickLeave => {
            coach.sick_leave(&who).await;
        }
        Hashtag::Healthy => {
            coach.healthy(&who).await;
        }
        Hashtag::Change => {
            if coach.exchange(&who).await.is_none() {
                warn!(user_id = who.user_id, chat_id = who.chat_id, "Exchange for unknown member");
            }
        }
    }

    Ok(())
}
