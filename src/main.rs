//! fatleopard - Telegram group coach for lazy leopards

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fatleopard::clock::Clock;
use fatleopard::db::Database;
use fatleopard::tui::App;
use fatleopard::Settings;

#[derive(Parser)]
#[command(name = "fatleopard")]
#[command(author, version, about = "Fat Leopard - training streaks and inactivity removal for Telegram groups")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start Telegram bot
    Bot {
        /// Telegram bot token (or set TELOXIDE_TOKEN env var)
        #[arg(short, long, env = "TELOXIDE_TOKEN")]
        token: String,
    },

    /// List member records
    Members {
        /// Only this chat
        #[arg(short, long, allow_hyphen_values = true)]
        chat: Option<i64>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Open TUI dashboard
    Tui {
        /// Only this chat
        #[arg(short, long, allow_hyphen_values = true)]
        chat: Option<i64>,
    },

    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    let clock = Clock::new(settings.reference_tz);

    match cli.command {
        Some(Commands::Bot { token }) => {
            println!("Starting Telegram bot...");
            println!("База данных: {}", settings.db_path.display());
            fatleopard::bot::run_bot(token, settings).await?;
        }

        Some(Commands::Members { chat, json }) => {
            let db = Database::open(&settings.db_path)?.with_clock(clock);
            let members = match chat {
                Some(chat_id) => db.list_active_records(chat_id)?,
                None => db.list_all()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&members)?);
            } else {
                println!("{:<24} | {:>14} | {:>8} | {:>6} | {:>6} | {}", "Member", "Chat", "Calories", "Cups", "Streak", "Status");
                println!("{:-<80}", "");
                for m in &members {
                    println!(
                        "{:<24} | {:>14} | {:>8} | {:>6} | {:>6} | {}",
                        m.display_name, m.chat_id, m.calories, m.cups, m.streak_days, m.status()
                    );
                }
            }
        }

        Some(Commands::Stats) => {
            let db = Database::open(&settings.db_path)?.with_clock(clock);
            let stats = db.stats()?;
            println!("Store statistics");
            println!("{:-<40}", "");
            println!("Records:        {}", stats.total);
            println!("Active:         {}", stats.active);
            println!("Removed:        {}", stats.deleted);
            println!("On sick leave:  {}", stats.on_sick_leave);
            println!("Exempt:         {}", stats.exempt);
            println!("With timers:    {}", stats.with_timers);
            println!("Trainings:      {}", stats.trainings);
        }

        Some(Commands::Tui { chat }) => {
            let db = Database::open(&settings.db_path)?.with_clock(clock);
            let mut app = App::new(db, clock, settings.timers.full_duration, chat)?;
            app.run()?;
        }

        None => {
            // Default: show TUI
            let db = Database::open(&settings.db_path)?.with_clock(clock);
            let mut app = App::new(db, clock, settings.timers.full_duration, None)?;
            app.run()?;
        }
    }

    Ok(())
}
