use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::app::{App, Move};

// --- Event Handling ---

pub async fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) {
    match key.code {
      KeyCode::Char('c') => app.should_quit = true,
      KeyCode::Char('t') => app.next_theme(),
      KeyCode::Char('s') => app.stop().await,
      _ => {}
    }
    return Ok(());
  }

  match key.code {
    KeyCode::Char('q') | KeyCode::Esc => {
      app.should_quit = true;
    }

    // Category buttons
    KeyCode::Tab => app.next_category(true),
    KeyCode::BackTab => app.next_category(false),
    KeyCode::Char(c @ '1'..='9') => {
      if let Some(digit) = c.to_digit(10) {
        app.select_category_at(digit as usize - 1);
      }
    }

    // Grid cursor
    KeyCode::Left | KeyCode::Char('h') => app.move_cursor(Move::Left),
    KeyCode::Right | KeyCode::Char('l') => app.move_cursor(Move::Right),
    KeyCode::Up | KeyCode::Char('k') => app.move_cursor(Move::Up),
    KeyCode::Down | KeyCode::Char('j') => app.move_cursor(Move::Down),

    // Pages
    KeyCode::Char(']') | KeyCode::PageDown => app.next_page(),
    KeyCode::Char('[') | KeyCode::PageUp => app.previous_page(),

    // Playback
    KeyCode::Enter => app.play_cursor().await,
    KeyCode::Char('p') => app.activate_featured().await,
    KeyCode::Char(' ') => app.toggle_pause().await,
    _ => {}
  }
  Ok(())
}
