//! Chat texts

use std::time::Duration;

use crate::config::ExchangeTerms;
use crate::db::{StoreStats, UserRecord};
use crate::exchange::ExchangeOutcome;
use crate::phrases::{self, Mood};
use crate::rewards::{MilestoneRule, RewardPolicy};

/// Cups above which a member is on the super level
pub const SUPER_LEVEL_CUPS: i64 = 420;

/// Format a duration to a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}с", secs)
    } else if secs < 3600 {
        format!("{}м {}с", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}ч {}м", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}д {}ч", secs / 86_400, (secs % 86_400) / 3600)
    }
}

fn rules(policy: &RewardPolicy, terms: &ExchangeTerms, full: Duration, lead: Duration) -> String {
    let mut text = format!(
        "⏰ Как я слежу за тренировками:\n\
        • Каждый #training_done перезапускает таймер на {}\n\
        • За {} до конца таймера - предупреждение\n\
        • Таймер истёк - удаление из чата\n\
        • 🏆 За каждую тренировку = {} кубок\n",
        format_duration(full),
        format_duration(lead),
        policy.cups_per_training
    );
    for rule in &policy.milestones {
        text.push_str(&format!("• 🏆 {} дней подряд = {} кубков\n", rule.days, rule.cups));
    }
    text.push_str(&format!(
        "\n🏥 #sick_leave - больничный (таймер на паузе)\n\
        💪 #healthy - выздоровел (таймер продолжается)\n\
        🔄 #change - обмен: {} калорий = {} кубков\n",
        terms.rate, terms.cups_per_exchange
    ));
    text
}

pub fn welcome(name: &str, policy: &RewardPolicy, terms: &ExchangeTerms, full: Duration, lead: Duration) -> String {
    format!(
        "{}, добро пожаловать в стаю! 🦁\n\n\
        Я хладнокровный тренер: всё вижу и не оставляю в стае тех, кто не тренируется.\n\n\
        Таймер уже запущен! У тебя есть {} на первую тренировку.\n\n\
        {}\n\
        🎯 Начни прямо сейчас - отправь #training_done!",
        name,
        format_duration(full),
        rules(policy, terms, full, lead)
    )
}

pub fn start(policy: &RewardPolicy, terms: &ExchangeTerms, full: Duration, lead: Duration) -> String {
    format!(
        "🦁 Fat Leopard\n\n\
        Помогаю оставаться в форме и не стать жирным леопардом!\n\n\
        /help - все команды\n\
        /points - мои калории\n\
        /cups - мои кубки\n\
        /top - лидеры\n\n\
        {}",
        rules(policy, terms, full, lead)
    )
}

pub fn help(commands: &str, policy: &RewardPolicy, terms: &ExchangeTerms, full: Duration, lead: Duration) -> String {
    format!(
        "{}\n\n\
        Хэштеги:\n\
        #training_done - отчёт о тренировке\n\
        #sick_leave - больничный\n\
        #healthy - выздоровел\n\
        #change - обменять калории на кубки\n\n\
        {}",
        commands,
        rules(policy, terms, full, lead)
    )
}

pub fn training_accepted(streak: u32, calories_added: i64, calories_total: i64, cups_added: i64, cups_total: i64, full: Duration) -> String {
    format!(
        "✅ Отчёт принят! 💪\n\n\
        🦁 Ты тренируешься дней подряд: {}\n\
        🔥 +{} калорий\n\
        🔥 Всего калорий: {}\n\
        🏆 +{} кубок за тренировку!\n\
        🏆 Всего кубков: {}\n\n\
        ⏰ Таймер перезапущен на {}\n\n\
        {}",
        streak,
        calories_added,
        calories_total,
        cups_added,
        cups_total,
        format_duration(full),
        phrases::line(Mood::Praise)
    )
}

pub fn extra_training(cups_added: i64, cups_total: i64) -> String {
    let cups = if cups_added > 0 {
        format!("🏆 +{} кубок за дополнительную тренировку!\n", cups_added)
    } else {
        String::new()
    };
    format!(
        "🦁 Какой мотивированный леопард! Ещё одна тренировка сегодня! 💪\n\n\
        {}🏆 Всего кубков: {}\n\n\
        ⏰ Таймер перезапущен\n\n\
        🎯 Завтра снова отправляй #training_done для продолжения серии!",
        cups, cups_total
    )
}

pub fn milestone(name: &str, rule: &MilestoneRule, calories_added: i64, cups_total: i64) -> String {
    format!(
        "🎉 {} закрывает {} серию: {} дней подряд! 🎉\n\n\
        🏆 +{} кубков!\n\
        🔥 +{} калорий\n\
        🏆 Всего кубков: {}\n\n\
        {}",
        name,
        rule.milestone.title_ru(),
        rule.days,
        rule.cups,
        calories_added,
        cups_total,
        phrases::line(Mood::Praise)
    )
}

pub fn super_level(name: &str, cups: i64) -> String {
    format!(
        "🌟⚡ СУПЕР-УРОВЕНЬ! ⚡🌟\n\n\
        👤 {}\n\
        🎯 Всего заработано кубков: {}\n\n\
        🦁 Fat Leopard в полном восторге! Ты не просто чемпион, ты супер-леопард!",
        name, cups
    )
}

pub fn exchange_unlocked(calories: i64, terms: &ExchangeTerms) -> String {
    format!(
        "💱 У тебя {} калорий! Можно обменять {} калорий на {} кубков: отправь #change",
        calories, terms.rate, terms.cups_per_exchange
    )
}

pub fn exchange_done(outcome: &ExchangeOutcome) -> String {
    format!(
        "🔄 Обмен выполнен!\n\n\
        🔥 Потрачено калорий: {}\n\
        🏆 Получено кубков: {}\n\n\
        🔥 Осталось калорий: {}\n\
        🏆 Всего кубков: {}\n\n\
        ⚠️ Калорийная серия начинается заново",
        outcome.calories_spent, outcome.cups_gained, outcome.calories_left, outcome.cups_total
    )
}

pub fn exchange_insufficient(calories: i64, terms: &ExchangeTerms) -> String {
    format!(
        "❌ Недостаточно калорий для обмена.\n\n\
        🔥 У тебя: {}\n\
        🔄 Нужно: {} калорий за {} кубков",
        calories, terms.rate, terms.cups_per_exchange
    )
}

pub fn sick_leave_started(frozen: Duration) -> String {
    format!(
        "🏥 Больничный принят! 🤒\n\n\
        ⏸️ Таймер приостановлен на время болезни\n\
        ❄️ После выздоровления останется: {} до удаления\n\n\
        📝 Когда поправишься, отправь #healthy\n\n\
        {}",
        format_duration(frozen),
        phrases::line(Mood::Care)
    )
}

pub fn sick_leave_already(frozen: Duration) -> String {
    format!(
        "🏥 Ты уже на больничном.\n\n❄️ Заморожено: {}\n📝 Отправь #healthy, когда поправишься",
        format_duration(frozen)
    )
}

pub fn healthy_resumed(remaining: Duration) -> String {
    format!(
        "💪 Выздоровление принято! 🎉\n\n\
        ⏰ Таймер возобновлён с места остановки\n\
        ⏳ До удаления осталось: {}\n\n\
        🦁 Не дай мне стать жирным леопардом!",
        format_duration(remaining)
    )
}

pub fn healthy_without_timer() -> String {
    "💪 Выздоровление принято! 🎉\n\nТаймер для тебя не запускается.".to_string()
}

pub fn healthy_expired() -> String {
    format!(
        "⏰ Время истекло! 🚫\n\nВыздоровление принято, но время таймера уже закончилось.\n\n{}",
        phrases::line(Mood::Threat)
    )
}

pub fn not_sick() -> String {
    "🤔 Ты не на больничном. Тренируйся и отправляй #training_done!".to_string()
}

pub fn warning(name: &str, remaining: Duration) -> String {
    format!(
        "⚠️ Предупреждение!\n\n\
        {}, до удаления из чата осталось: {}\n\n\
        {}\n\n\
        🎯 Отправь #training_done прямо сейчас!",
        name,
        format_duration(remaining),
        phrases::line(Mood::Threat)
    )
}

pub fn removed(name: &str) -> String {
    format!(
        "🚫 Пользователь удалён!\n\n{} был удалён из чата за неактивность.\n\n{}",
        name,
        phrases::line(Mood::Threat)
    )
}

pub fn removal_failed(name: &str) -> String {
    format!(
        "⚠️ Не удалось удалить {} из чата. Проверьте, что у бота есть права администратора.",
        name
    )
}

pub fn leaderboard(records: &[UserRecord]) -> String {
    if records.is_empty() {
        return "🏆 Пока никто не сжёг ни одной калории. Отправь #training_done!".to_string();
    }
    let mut text = String::from("🏆 Топ по калориям:\n\n");
    for (place, record) in records.iter().enumerate() {
        let medal = match place {
            0 => "🥇",
            1 => "🥈",
            2 => "🥉",
            _ => "•",
        };
        text.push_str(&format!(
            "{} {} - {} калорий, {} кубков\n",
            medal, record.display_name, record.calories, record.cups
        ));
    }
    text
}

pub fn points(record: &UserRecord, trainings: i64) -> String {
    format!(
        "🔥 Твои калории:\n\n\
        👤 {}\n\
        🔥 Всего калорий: {}\n\
        🦁 Серия: {} дней\n\
        📝 Отчётов: {}\n\n\
        💡 Отправляй #training_done для сжигания калорий!",
        record.display_name, record.calories, record.streak_days, trainings
    )
}

pub fn cups(record: &UserRecord) -> String {
    if record.cups > SUPER_LEVEL_CUPS {
        return super_level(&record.display_name, record.cups);
    }
    format!(
        "🏆 Твои кубки:\n\n\
        👤 {}\n\
        🎯 Всего заработано кубков: {}\n\n\
        💡 Отправляй #training_done для получения кубков!",
        record.display_name, record.cups
    )
}

pub fn list_users(records: &[UserRecord]) -> String {
    if records.is_empty() {
        return "📋 В базе пока никого нет".to_string();
    }
    let mut text = String::from("📋 Участники:\n\n");
    for record in records {
        let mark = if record.exempt_from_removal { "✅" } else { "❌" };
        let sick = if record.is_on_sick_leave() { " 🏥" } else { "" };
        text.push_str(&format!(
            "{} {} (id {}){} - {} кал., {} куб.\n",
            mark, record.display_name, record.user_id, sick, record.calories, record.cups
        ));
    }
    text.push_str("\n✅ = исключен из удаления\n❌ = подпадает под правило удаления");
    text
}

pub fn db_stats(stats: &StoreStats, active_timers: usize) -> String {
    format!(
        "📊 Статистика БД:\n\n\
        👥 Всего записей: {}\n\
        🟢 Активных: {}\n\
        🚫 Удалённых: {}\n\
        🏥 На больничном: {}\n\
        🛡️ Исключены из удаления: {}\n\
        ⏰ Таймеров в базе: {}\n\
        ⏱️ Таймеров в памяти: {}\n\
        📝 Отчётов о тренировках: {}",
        stats.total,
        stats.active,
        stats.deleted,
        stats.on_sick_leave,
        stats.exempt,
        stats.with_timers,
        active_timers,
        stats.trainings
    )
}

pub fn exempt_set(name: &str) -> String {
    format!("✅ Пользователь {} исключен из правила удаления за неактивность", name)
}

pub fn exempt_removed(name: &str) -> String {
    format!("✅ Пользователь {} больше не исключен из правила удаления. Таймер запущен.", name)
}

pub fn member_not_found(name: &str) -> String {
    format!("❌ Пользователь {} не найден в этом чате", name)
}

pub fn timers_started(started: usize, skipped: usize) -> String {
    format!("⏰ Таймеры запущены: {}\n⏭️ Пропущено (исключены или на больничном): {}", started, skipped)
}

pub fn admin_only() -> String {
    "❌ Эта команда только для администраторов".to_string()
}

pub fn owner_only() -> String {
    "❌ Эта команда только для владельца бота".to_string()
}

pub fn usage(example: &str) -> String {
    format!("ℹ️ Использование: {}", example)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ranges() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42с");
        assert_eq!(format_duration(Duration::from_secs(90)), "1м 30с");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 120)), "3ч 2м");
        assert_eq!(format_duration(Duration::from_secs(5 * 86_400 + 7200)), "5д 2ч");
    }

    #[test]
    fn test_rules_list_every_milestone() {
        let policy = RewardPolicy::default();
        let text = start(&policy, &ExchangeTerms::default(), Duration::from_secs(7 * 86_400), Duration::from_secs(86_400));
        for rule in &policy.milestones {
            assert!(text.contains(&format!("{} дней подряд", rule.days)));
        }
        assert!(text.contains("100 калорий = 42 кубков"));
    }

    #[test]
    fn test_cups_switches_to_super_level() {
        let mut record = UserRecord::new(1, -100, "@leo");
        record.cups = 421;
        assert!(cups(&record).contains("СУПЕР-УРОВЕНЬ"));
        record.cups = 420;
        assert!(!cups(&record).contains("СУПЕР-УРОВЕНЬ"));
    }

    #[test]
    fn test_leaderboard_medals() {
        let records: Vec<UserRecord> = (1..=4)
            .map(|i| UserRecord::new(i, -100, format!("@m{}", i)))
            .collect();
        let text = leaderboard(&records);
        assert!(text.contains("🥇 @m1"));
        assert!(text.contains("🥉 @m3"));
        assert!(text.contains("• @m4"));
    }

    #[test]
    fn test_extra_training_without_cups() {
        assert!(!extra_training(0, 5).contains("+0"));
        assert!(extra_training(1, 5).contains("+1"));
    }
}
