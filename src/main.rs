//! Interactive TUI dashboard for comparing balance providers.
//!
//! This binary queries one account through the multi-provider resolver and shows
//! which provider answered and how fast. Features include:
//! - Fallback, compare-all and single-provider modes
//! - Sequential or parallel chain RPC endpoint rotation
//! - Batch testing and per-provider outcome tallies
//! - A live progress log, with logs written to `balance-dashboard.log`

mod app;
mod env;
mod query;
mod ui;

use std::{fs::File, sync::Mutex, time::Duration};

use app::{App, AppEvent, Mode};
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use env::settings_from_env;
use query::spawn_balance_query;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use ui::draw_ui;

const LOG_FILE: &str = "balance-dashboard.log";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let (settings, address) = settings_from_env()?;
    let mut app = App::new(settings, address)?;

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, &mut app).await;

    ratatui::restore();

    result
}

/// Logs go to a file so they do not tear the terminal UI.
fn init_tracing() -> Result<()> {
    let file = File::create(LOG_FILE)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_app(terminal: &mut ratatui::DefaultTerminal, app: &mut App) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();

    loop {
        while let Ok(ev) = rx.try_recv() {
            app.handle_event(ev);
        }

        terminal.draw(|frame| draw_ui(frame, app))?;

        if app.should_run_call() {
            spawn_balance_query(app, tx.clone());
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if crossterm::event::poll(Duration::from_millis(50))? {
            if let Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            {
                match code {
                    KeyCode::Char('q') => {
                        app.cancel_query();
                        break;
                    }
                    KeyCode::Up => app.prev_provider(),
                    KeyCode::Down => app.next_provider(),
                    KeyCode::Tab => app.toggle_mode(),
                    KeyCode::Char('p') => app.toggle_strategy(),
                    KeyCode::Char('r') => spawn_balance_query(app, tx.clone()),
                    KeyCode::Char(' ') => {
                        app.mode = Mode::SingleProvider;
                        spawn_balance_query(app, tx.clone());
                    }
                    KeyCode::Char('c') | KeyCode::Esc => app.cancel_query(),
                    KeyCode::Char('b') => app.toggle_batch_mode(),
                    KeyCode::Char('[') | KeyCode::Char(',') => app.decrease_batch_count(),
                    KeyCode::Char(']') | KeyCode::Char('.') | KeyCode::Char('/') => {
                        app.increase_batch_count();
                    }
                    KeyCode::Char('s') => app.reset_stats(),
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
