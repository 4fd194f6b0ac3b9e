use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use flower_core::agent::PendingTurn;
use flower_core::ai::run_turn;
use flower_core::WizardStep;
use tokio::sync::mpsc::UnboundedSender;

use crate::app::{App, FocusPane, InputMode};
use crate::tui::{AppEvent, ChatTarget};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Run a chat turn in the background, posting one event per stream item
fn spawn_turn(tx: &UnboundedSender<AppEvent>, target: ChatTarget, turn: PendingTurn) {
    let tx = tx.clone();
    tokio::spawn(async move {
        let PendingTurn {
            message_id,
            prompt,
            session,
        } = turn;
        run_turn(&session, &prompt, |event| {
            // The loop is gone when the app is quitting; nothing left to update
            let _ = tx.send(AppEvent::Turn {
                target,
                id: message_id,
                event,
            });
        })
        .await;
    });
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx)?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(std::time::Instant::now()),
        AppEvent::Turn { target, id, event } => app.apply_turn_event(target, id, event),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }
    app.status = None;

    if app.wizard.is_some() {
        match app.input_mode {
            InputMode::Normal => handle_wizard_normal(app, key, tx),
            InputMode::Editing => handle_wizard_editing(app, key),
        }
        return Ok(());
    }

    match (app.focus, app.input_mode) {
        (FocusPane::Hub, InputMode::Normal) => handle_hub_normal(app, key),
        (FocusPane::Hub, InputMode::Editing) => handle_search_editing(app, key),
        (FocusPane::Agent, InputMode::Normal) => handle_agent_normal(app, key),
        (FocusPane::Agent, InputMode::Editing) => handle_agent_editing(app, key, tx),
    }
    Ok(())
}

fn handle_hub_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Navigation
        KeyCode::Char('j') | KeyCode::Down => app.hub_down(),
        KeyCode::Char('k') | KeyCode::Up => app.hub_up(),
        KeyCode::Char('g') => app.hub_first(),
        KeyCode::Char('G') => app.hub_last(),

        // Selection
        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_cursor_asset(),
        KeyCode::Char('c') => app.selection.clear(),
        KeyCode::Char('w') => {
            app.open_wizard();
        }

        // Search
        KeyCode::Char('/') => app.input_mode = InputMode::Editing,
        KeyCode::Esc => {
            app.hub.search.clear();
            app.search_changed();
        }

        // Agent panel
        KeyCode::Tab => app.focus = FocusPane::Agent,
        KeyCode::Char('a') => {
            app.focus = FocusPane::Agent;
            app.input_mode = InputMode::Editing;
        }
        _ => {}
    }
}

fn handle_search_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Enter => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Backspace => {
            app.hub.search.pop();
            app.search_changed();
        }
        KeyCode::Char(c) => {
            app.hub.search.push(c);
            app.search_changed();
        }
        _ => {}
    }
}

fn handle_agent_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.chat_scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.chat_scroll_up(),
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        KeyCode::Char('i') | KeyCode::Enter => {
            if !app.agent.is_unavailable() {
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Tab | KeyCode::Esc => app.focus = FocusPane::Hub,
        KeyCode::Char('w') => {
            app.open_wizard();
        }
        KeyCode::Char('c') => app.selection.clear(),
        _ => {}
    }
}

fn handle_agent_editing(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    // The input is read-only while a reply streams in
    if app.agent.is_generating() && !matches!(key.code, KeyCode::Esc) {
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Rejected sends (blank input, reply in flight) leave the input as typed
            if let Some(turn) = app.send_agent_message() {
                spawn_turn(tx, ChatTarget::Agent, turn);
            }
            if app.agent.is_unavailable() {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if app.agent_cursor > 0 {
                app.agent_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.agent.input, app.agent_cursor);
                app.agent.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.agent.input.chars().count();
            if app.agent_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.agent.input, app.agent_cursor);
                app.agent.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.agent_cursor = app.agent_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.agent.input.chars().count();
            app.agent_cursor = (app.agent_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.agent_cursor = 0;
        }
        KeyCode::End => {
            app.agent_cursor = app.agent.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.agent.input, app.agent_cursor);
            app.agent.input.insert(byte_pos, c);
            app.agent_cursor += 1;
        }
        _ => {}
    }
}

fn handle_wizard_normal(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    let step = app.wizard.as_ref().map(|w| w.step());

    match key.code {
        KeyCode::Esc => app.close_wizard(),

        // Steps
        KeyCode::Char('n') | KeyCode::Right => app.wizard_next(),
        KeyCode::Char('b') | KeyCode::Left => app.wizard_back(),

        // Fields, or output scroll on the last two steps
        KeyCode::Char('j') | KeyCode::Down => match step {
            Some(WizardStep::Review | WizardStep::Generate) => {
                app.wizard_scroll = app.wizard_scroll.saturating_add(1);
            }
            _ => app.wizard_field_down(),
        },
        KeyCode::Char('k') | KeyCode::Up => match step {
            Some(WizardStep::Review | WizardStep::Generate) => {
                app.wizard_scroll = app.wizard_scroll.saturating_sub(1);
            }
            _ => app.wizard_field_up(),
        },

        // Rows
        KeyCode::Char('a') => app.add_wizard_row(),
        KeyCode::Char('d') => app.remove_wizard_row(),

        KeyCode::Enter | KeyCode::Char('g') if step == Some(WizardStep::Generate) => {
            if let Some((target, turn)) = app.start_generation() {
                spawn_turn(tx, target, turn);
            }
        }
        KeyCode::Enter => app.activate_wizard_field(),
        _ => {}
    }
}

fn handle_wizard_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_wizard_edit(),
        KeyCode::Enter => app.commit_wizard_edit(),
        KeyCode::Backspace => {
            if let Some(buffer) = app.wizard_edit.as_mut() {
                buffer.pop();
            }
        }
        KeyCode::Char(c) => {
            if let Some(buffer) = app.wizard_edit.as_mut() {
                buffer.push(c);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flower_core::ai::TurnEvent;
    use flower_core::Config;
    use tokio::sync::mpsc;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, tx: &UnboundedSender<AppEvent>, text: &str) {
        for c in text.chars() {
            handle_event(app, press(KeyCode::Char(c)), tx).unwrap();
        }
    }

    #[test]
    fn test_search_filters_hub() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new());

        handle_event(&mut app, press(KeyCode::Char('/')), &tx).unwrap();
        type_text(&mut app, &tx, "sync");
        handle_event(&mut app, press(KeyCode::Enter), &tx).unwrap();

        assert_eq!(app.hub.search, "sync");
        assert_eq!(app.sections().len(), 1);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_wizard_keys_without_selection_show_status() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        handle_event(&mut app, press(KeyCode::Char('w')), &tx).unwrap();
        assert!(app.wizard.is_none());
        assert!(app.status.is_some());

        handle_event(&mut app, press(KeyCode::Char(' ')), &tx).unwrap();
        handle_event(&mut app, press(KeyCode::Char('w')), &tx).unwrap();
        assert!(app.wizard.is_some());

        handle_event(&mut app, press(KeyCode::Esc), &tx).unwrap();
        assert!(app.wizard.is_none());
        assert!(app.selection.is_empty());
    }

    #[test]
    fn test_agent_input_editing_keeps_cursor() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        handle_event(&mut app, press(KeyCode::Char('a')), &tx).unwrap();
        type_text(&mut app, &tx, "hllo");
        handle_event(&mut app, press(KeyCode::Home), &tx).unwrap();
        handle_event(&mut app, press(KeyCode::Right), &tx).unwrap();
        type_text(&mut app, &tx, "e");
        assert_eq!(app.agent.input, "hello");
        assert_eq!(app.agent_cursor, 2);
    }

    #[test]
    fn test_missing_key_reported_once_in_transcript() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        app.key_lookup = |_| None;

        handle_event(&mut app, press(KeyCode::Char('a')), &tx).unwrap();
        type_text(&mut app, &tx, "hi");
        handle_event(&mut app, press(KeyCode::Enter), &tx).unwrap();

        assert_eq!(app.agent.messages().len(), 2);
        assert!(app.agent.is_unavailable());
        assert_eq!(app.input_mode, InputMode::Normal);

        // Trying again doesn't repeat the notice
        app.agent.input = "again".to_string();
        handle_event(&mut app, press(KeyCode::Enter), &tx).unwrap();
        assert_eq!(app.agent.messages().len(), 2);
    }

    #[test]
    fn test_typing_is_ignored_while_reply_streams() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config {
            provider: Some("ollama".to_string()),
            ..Config::new()
        });

        handle_event(&mut app, press(KeyCode::Char('a')), &tx).unwrap();
        type_text(&mut app, &tx, "hi");
        let turn = app.send_agent_message().unwrap();
        assert!(app.agent.is_generating());

        type_text(&mut app, &tx, "more");
        handle_event(&mut app, press(KeyCode::Backspace), &tx).unwrap();
        assert_eq!(app.agent.input, "");
        assert_eq!(app.agent_cursor, 0);

        app.apply_turn_event(ChatTarget::Agent, turn.message_id, TurnEvent::Done);
        type_text(&mut app, &tx, "ok");
        assert_eq!(app.agent.input, "ok");

        handle_event(&mut app, press(KeyCode::Esc), &tx).unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_clear_selection_from_agent_panel() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        handle_event(&mut app, press(KeyCode::Char(' ')), &tx).unwrap();
        assert_eq!(app.selection.len(), 1);

        handle_event(&mut app, press(KeyCode::Tab), &tx).unwrap();
        handle_event(&mut app, press(KeyCode::Char('c')), &tx).unwrap();
        assert!(app.selection.is_empty());
    }
}
