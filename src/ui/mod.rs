//! Terminal front end

pub mod conversation;

use crate::config::Config;
use anyhow::{Context, Result};
use conversation::{ConversationAction, ConversationManager};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::time::Duration;
use tracing::info;

type Tui = Terminal<CrosstermBackend<Stdout>>;

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;

    Terminal::new(CrosstermBackend::new(stdout)).inspect_err(|_| {
        let _ = disable_raw_mode();
    }).context("Failed to initialise terminal")
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableBracketedPaste)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Leave the alternate screen before a panic message is printed
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableBracketedPaste);
        previous(panic);
    }));
}

/// Run the interactive chat until the user quits
pub async fn run(config: Config, model: Option<String>, api_key: Option<String>) -> Result<()> {
    let mut manager = ConversationManager::new(config, model, api_key)?;

    install_panic_hook();
    let mut terminal = setup_terminal()?;
    info!("terminal ui started");

    let result = event_loop(&mut terminal, &mut manager);
    restore_terminal(&mut terminal)?;
    info!("terminal ui stopped");
    result
}

fn event_loop(terminal: &mut Tui, manager: &mut ConversationManager) -> Result<()> {
    loop {
        manager.tick();
        terminal.draw(|frame| manager.render(frame))?;

        if !event::poll(FRAME_INTERVAL)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                if manager.handle_key(key) == ConversationAction::Exit {
                    return Ok(());
                }
            }
            Event::Paste(text) => manager.handle_paste(&text),
            _ => {}
        }
    }
}
