use anyhow::Result;

mod api;
mod app;
mod categories;
mod config;
mod conversation;
mod handler;
mod logging;
mod markdown;
mod speech;
mod tui;
mod ui;
mod view;

use app::{join_task, App};
use config::Config;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::new()
    });

    // Logging is best effort; the app runs without a log file.
    if let Ok(dir) = Config::config_dir() {
        if let Err(e) = logging::init(&dir) {
            eprintln!("Logging disabled: {}", e);
        }
    }
    tracing::info!(api = %config.api_base_url(), "starting nyaya");

    let (width, _) = crossterm::terminal::size()?;
    let mut app = App::new(&config, width).await?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app).await;

    tui::restore()?;
    app.voice_input.stop_listening();
    app.voice_output.stop();

    if let Err(e) = &result {
        tracing::error!("exited with error: {:#}", e);
    }
    result
}

async fn run(terminal: &mut Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event)?,
                None => app.should_quit = true,
            },
            outcome = join_task(&mut app.query_task) => app.finish_query(outcome),
            outcome = join_task(&mut app.health_task) => app.finish_health_check(outcome),
            event = app.voice_input.next_event() => app.apply_recognition(event),
        }
    }

    Ok(())
}
