use std::io::{self, Stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use super::app::App;

type Backend = CrosstermBackend<Stdout>;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Control-key shortcuts handled before the per-mode key dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shortcut {
    Quit,
    Reload,
    Export,
}

fn shortcut(key: &KeyEvent) -> Option<Shortcut> {
    if !key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    match key.code {
        KeyCode::Char('c') => Some(Shortcut::Quit),
        KeyCode::Char('r') => Some(Shortcut::Reload),
        KeyCode::Char('x') => Some(Shortcut::Export),
        _ => None,
    }
}

/// Take over the terminal and run the UI until the user quits.
///
/// Ctrl+C quits from any mode, Ctrl+R reloads every tab and Ctrl+X writes a
/// CSV export. The terminal is restored even when the loop fails.
pub fn run_app(app: &mut App) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, app);
    cleanup_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<Backend>> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("failed to create terminal backend")
}

fn event_loop(terminal: &mut Terminal<Backend>, app: &mut App) -> Result<()> {
    loop {
        terminal
            .draw(|frame| app.draw(frame))
            .context("failed to draw frame")?;

        if !event::poll(POLL_INTERVAL).context("event polling failed")? {
            continue;
        }
        let Event::Key(key) = event::read().context("failed to read event")? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match shortcut(&key) {
            Some(Shortcut::Quit) => return Ok(()),
            Some(Shortcut::Reload) => app.handle_ctrl_r()?,
            Some(Shortcut::Export) => app.handle_ctrl_x(),
            None => {
                if app.handle_key(key.code)? {
                    return Ok(());
                }
            }
        }
    }
}

fn cleanup_terminal(terminal: &mut Terminal<Backend>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal
        .show_cursor()
        .context("failed to restore cursor visibility")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_control_chords_are_shortcuts() {
        let ctrl = |ch| KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL);
        assert_eq!(shortcut(&ctrl('c')), Some(Shortcut::Quit));
        assert_eq!(shortcut(&ctrl('r')), Some(Shortcut::Reload));
        assert_eq!(shortcut(&ctrl('x')), Some(Shortcut::Export));
        assert_eq!(shortcut(&ctrl('z')), None);

        let plain = KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE);
        assert_eq!(shortcut(&plain), None);
    }
}
