//! Phrases module - реплики Жирного Леопарда

use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mood {
    Praise,    // Похвала за отчёт
    Threat,    // Угроза ленивым
    Care,      // Больничный
}

impl Mood {
    pub fn emoji(&self) -> &'static str {
        match self {
            Mood::Praise => "🦁",
            Mood::Threat => "😼",
            Mood::Care => "🩹",
        }
    }
}

pub struct Phrase {
    pub mood: Mood,
    pub text: &'static str,
}

pub const PHRASES: &[Phrase] = &[
    // === ПОХВАЛА ===
    Phrase {
        mood: Mood::Praise,
        text: "Так держать! Стая гордится тобой.",
    },
    Phrase {
        mood: Mood::Praise,
        text: "Ещё один день без жира. Я голодаю, и это твоя заслуга.",
    },
    Phrase {
        mood: Mood::Praise,
        text: "Серия растёт, а я худею от зависти.",
    },
    Phrase {
        mood: Mood::Praise,
        text: "Настоящий леопард тренируется, даже когда никто не смотрит. Но я смотрю.",
    },
    Phrase {
        mood: Mood::Praise,
        text: "Не сбавляй темп: завтра снова жду #training_done.",
    },
    // === УГРОЗА ===
    Phrase {
        mood: Mood::Threat,
        text: "Я питаюсь ленивыми леопардами и становлюсь жирнее!",
    },
    Phrase {
        mood: Mood::Threat,
        text: "Ты ведь не хочешь стать как я? Тогда тренируйся и отправляй отчёты!",
    },
    Phrase {
        mood: Mood::Threat,
        text: "Диван мягкий, но стая не ждёт.",
    },
    Phrase {
        mood: Mood::Threat,
        text: "Я уже повязал салфетку. Не дай мне пообедать тобой.",
    },
    // === ЗАБОТА ===
    Phrase {
        mood: Mood::Care,
        text: "Выздоравливай и возвращайся к тренировкам!",
    },
    Phrase {
        mood: Mood::Care,
        text: "Пей чай с мёдом. Таймер подождёт.",
    },
    Phrase {
        mood: Mood::Care,
        text: "Отдых тоже часть тренировки. Но не затягивай.",
    },
];

pub fn random_phrase(mood: Mood) -> &'static Phrase {
    let matching: Vec<&Phrase> = PHRASES.iter().filter(|p| p.mood == mood).collect();
    matching
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(&PHRASES[0])
}

pub fn format_phrase(phrase: &Phrase) -> String {
    format!("{} {}", phrase.mood.emoji(), phrase.text)
}

/// Random line of the given mood, ready to append to a message
pub fn line(mood: Mood) -> String {
    format_phrase(random_phrase(mood))
}
