//! TUI module - Terminal dashboard over the member table

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};
use std::io::{stdout, Stdout};

use crate::clock::Clock;
use crate::db::{Database, UserRecord};
use crate::messages::format_duration;
use crate::timers::remaining_after;

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Calories,
    Streak,
    Cups,
}

impl SortBy {
    fn next(self) -> Self {
        match self {
            SortBy::Calories => SortBy::Streak,
            SortBy::Streak => SortBy::Cups,
            SortBy::Cups => SortBy::Calories,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SortBy::Calories => "calories",
            SortBy::Streak => "streak",
            SortBy::Cups => "cups",
        }
    }
}

/// App state for TUI
pub struct App {
    db: Database,
    clock: Clock,
    full_duration: Duration,
    chat_id: Option<i64>,
    members: Vec<UserRecord>,
    sort_by: SortBy,
    table_state: TableState,
    should_quit: bool,
}

impl App {
    pub fn new(db: Database, clock: Clock, full_duration: Duration, chat_id: Option<i64>) -> Result<Self> {
        let mut app = Self {
            db,
            clock,
            full_duration,
            chat_id,
            members: Vec::new(),
            sort_by: SortBy::Calories,
            table_state: TableState::default(),
            should_quit: false,
        };
        app.refresh()?;
        Ok(app)
    }

    fn refresh(&mut self) -> Result<()> {
        let mut members = match self.chat_id {
            Some(chat_id) => self.db.list_active_records(chat_id)?,
            None => self.db.list_all()?,
        };
        sort_members(&mut members, self.sort_by);
        self.members = members;
        if self.members.is_empty() {
            self.table_state.select(None);
        } else if self.table_state.selected().is_none() {
            self.table_state.select(Some(0));
        }
        Ok(())
    }

    /// Run the TUI application
    pub fn run(&mut self) -> Result<()> {
        let mut terminal = init_terminal()?;

        while !self.should_quit {
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events()?;
        }

        restore_terminal()?;
        Ok(())
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(3),
            ])
            .split(area);

        // Header
        let scope = match self.chat_id {
            Some(chat_id) => format!("chat {}", chat_id),
            None => "all chats".to_string(),
        };
        let header = Paragraph::new(format!("Fat Leopard - {} members ({})", self.members.len(), scope))
            .style(Style::default().fg(Color::Yellow).bold())
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, chunks[0]);

        // Member table
        let now = self.clock.now();
        let rows: Vec<Row> = self
            .members
            .iter()
            .map(|m| {
                let style = if m.is_deleted {
                    Style::default().fg(Color::DarkGray)
                } else if m.is_on_sick_leave() {
                    Style::default().fg(Color::Magenta)
                } else {
                    Style::default()
                };
                Row::new(member_cells(m, now, self.full_duration).map(Cell::from)).style(style)
            })
            .collect();

        let table = Table::new(
            rows,
            [
                Constraint::Min(18),
                Constraint::Length(16),
                Constraint::Length(9),
                Constraint::Length(7),
                Constraint::Length(7),
                Constraint::Length(12),
                Constraint::Length(10),
                Constraint::Length(8),
            ],
        )
        .header(Row::new(vec!["Member", "Chat", "Calories", "Cups", "Streak", "Last", "Timer", "Status"])
            .style(Style::default().bold()))
        .row_highlight_style(Style::default().reversed())
        .block(Block::default().borders(Borders::ALL).title(format!("Members by {}", self.sort_by.label())));

        frame.render_stateful_widget(table, chunks[1], &mut self.table_state);

        // Footer
        let footer = Paragraph::new("q: quit | r: refresh | s: sort | j/k: move")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(footer, chunks[2]);
    }

    fn handle_events(&mut self) -> Result<()> {
        if event::poll(std::time::Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => self.should_quit = true,
                        KeyCode::Char('r') => self.refresh()?,
                        KeyCode::Char('s') => {
                            self.sort_by = self.sort_by.next();
                            self.refresh()?;
                        }
                        KeyCode::Char('j') | KeyCode::Down => self.table_state.select_next(),
                        KeyCode::Char('k') | KeyCode::Up => self.table_state.select_previous(),
                        _ => {}
                    }
                }
        Ok(())
    }
}

fn sort_members(members: &mut [UserRecord], sort_by: SortBy) {
    match sort_by {
        SortBy::Calories => members.sort_by(|a, b| b.calories.cmp(&a.calories)),
        SortBy::Streak => members.sort_by(|a, b| b.streak_days.cmp(&a.streak_days)),
        SortBy::Cups => members.sort_by(|a, b| b.cups.cmp(&a.cups)),
    }
}

fn timer_cell(record: &UserRecord, now: DateTime<FixedOffset>, full: Duration) -> String {
    if let Some(leave) = record.sick_leave.as_ref().filter(|l| l.is_active()) {
        return format!("❄ {}", format_duration(leave.frozen_remaining));
    }
    match record.timer_started_at {
        Some(started_at) => match remaining_after(started_at, record.timer_duration_or(full), now) {
            Some(remaining) => format_duration(remaining),
            None => "expired".to_string(),
        },
        None => "-".to_string(),
    }
}

fn member_cells(record: &UserRecord, now: DateTime<FixedOffset>, full: Duration) -> [String; 8] {
    [
        record.display_name.clone(),
        record.chat_id.to_string(),
        record.calories.to_string(),
        record.cups.to_string(),
        record.streak_days.to_string(),
        record
            .last_training_date
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string()),
        timer_cell(record, now, full),
        record.status().to_string(),
    ]
}

fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{moscow_tz, span};
    use crate::db::SickLeave;
    use chrono::{NaiveDate, TimeZone};

    const DAY: Duration = Duration::from_secs(86_400);

    fn now() -> DateTime<FixedOffset> {
        moscow_tz().with_ymd_and_hms(2024, 9, 11, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_member_cells() {
        let mut record = UserRecord::new(1, -100, "@leo");
        record.calories = 12;
        record.streak_days = 3;
        record.last_training_date = NaiveDate::from_ymd_opt(2024, 9, 10);
        record.timer_started_at = Some(now() - span(DAY * 2));

        let cells = member_cells(&record, now(), DAY * 7);
        assert_eq!(cells[0], "@leo");
        assert_eq!(cells[2], "12");
        assert_eq!(cells[5], "2024-09-10");
        assert_eq!(cells[6], "5д 0ч");
        assert_eq!(cells[7], "active");
    }

    #[test]
    fn test_timer_cell_states() {
        let mut record = UserRecord::new(1, -100, "@leo");
        assert_eq!(timer_cell(&record, now(), DAY * 7), "-");

        record.timer_started_at = Some(now() - span(DAY * 8));
        assert_eq!(timer_cell(&record, now(), DAY * 7), "expired");

        record.sick_leave = Some(SickLeave::begin(now(), DAY * 3));
        assert_eq!(timer_cell(&record, now(), DAY * 7), "❄ 3д 0ч");
        assert_eq!(record.status(), "sick");
    }

    #[test]
    fn test_sort_members() {
        let mut members: Vec<UserRecord> = (1..=3).map(|i| UserRecord::new(i, -100, format!("@m{}", i))).collect();
        members[0].cups = 5;
        members[2].cups = 9;
        sort_members(&mut members, SortBy::Cups);
        assert_eq!(members.iter().map(|m| m.user_id).collect::<Vec<_>>(), vec![3, 1, 2]);
    }
}
