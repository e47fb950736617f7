use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, COPY_FEEDBACK_TICKS};
use crate::chat::{ChatMessage, ChatUpdate};
use crate::format;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key)?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Chat(update) => handle_chat_update(app, update),
    }
    Ok(())
}

fn handle_chat_update(app: &mut App, update: ChatUpdate) {
    match update {
        ChatUpdate::Delta(fragment) => app.apply_delta(&fragment),
        ChatUpdate::Done => app.finish_stream(),
        ChatUpdate::Failed => app.fail_stream(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to typing (rejected while a request is outstanding: the input
        // affordances stay disabled until the stream resolves)
        KeyCode::Char('i') | KeyCode::Enter => {
            if !app.busy {
                app.input_mode = InputMode::Editing;
                app.cursor = app.input.chars().count();
            }
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Code block selection and copy
        KeyCode::Char(']') => app.select_next_block(),
        KeyCode::Char('[') => app.select_prev_block(),
        KeyCode::Char('c') => {
            if let Some(code) = app.selected_block_code() {
                copy_to_clipboard(&code);
                app.copy_feedback = Some(COPY_FEEDBACK_TICKS);
            }
        }

        // Export the conversation as an HTML page
        KeyCode::Char('S') => {
            let page = format::render_transcript(&app.messages);
            match std::fs::write("chat-transcript.html", page) {
                Ok(()) => app.set_notice("Saved chat-transcript.html"),
                Err(_) => app.set_notice("Export failed"),
            }
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit(app),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Start a turn: append the user message, then run the request in a
/// background task that reports back through the event channel. The busy
/// flag inside `begin_submit` is the only concurrency control.
fn submit(app: &mut App) {
    let Some(messages) = app.begin_submit() else {
        return;
    };
    spawn_request(app, messages);
}

fn spawn_request(app: &App, messages: Vec<ChatMessage>) {
    let client = app.client.clone();
    let tx = app.events.clone();

    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let outcome = client
            .stream_chat(&messages, |fragment| {
                let _ = delta_tx.send(AppEvent::Chat(ChatUpdate::Delta(fragment.to_string())));
            })
            .await;

        let update = match outcome {
            Ok(_) => ChatUpdate::Done,
            Err(_) => ChatUpdate::Failed,
        };
        let _ = tx.send(AppEvent::Chat(update));
    });
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

/// Fire-and-forget clipboard write through the first available system
/// clipboard command. Failure is ignored.
fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let candidates: [(&str, &[&str]); 3] = [
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    for (program, args) in candidates {
        if let Ok(mut child) = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::sync::mpsc;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(Config::new(), tx)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn stream_updates_drive_the_controller() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();

        handle_chat_update(&mut app, ChatUpdate::Delta("Hel".to_string()));
        handle_chat_update(&mut app, ChatUpdate::Delta("lo".to_string()));
        handle_chat_update(&mut app, ChatUpdate::Done);

        assert_eq!(app.messages.last().unwrap().content, "Hello");
        assert!(!app.busy);
    }

    #[test]
    fn editing_keys_respect_utf8_boundaries() {
        let mut app = test_app();
        for c in "chào".chars() {
            handle_editing_mode(&mut app, press(KeyCode::Char(c)));
        }
        handle_editing_mode(&mut app, press(KeyCode::Backspace));
        assert_eq!(app.input, "chà");
        assert_eq!(app.cursor, 3);
    }

    #[test]
    fn entering_edit_mode_is_blocked_while_busy() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();

        handle_normal_mode(&mut app, press(KeyCode::Char('i')));
        assert_eq!(app.input_mode, InputMode::Normal);

        handle_chat_update(&mut app, ChatUpdate::Failed);
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[test]
    fn failure_path_appends_the_fixed_reply() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();
        handle_chat_update(&mut app, ChatUpdate::Delta("part".to_string()));
        handle_chat_update(&mut app, ChatUpdate::Failed);

        assert_eq!(app.messages.last().unwrap().content, crate::app::ERROR_REPLY);
    }
}
