use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode};
use crate::tui::AppEvent;
use crate::view::ViewMode;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => insert_text(app, &text),
        AppEvent::Resize(width, _) => app.on_resize(width),
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    app.status = None;

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Keys shared by every view
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
            return;
        }
        KeyCode::Char('n') => {
            app.new_chat();
            return;
        }
        KeyCode::Char('b') => {
            app.toggle_browser();
            return;
        }
        KeyCode::Char('[') => {
            app.view.toggle_sidebar();
            return;
        }
        KeyCode::Char('v') => {
            app.toggle_listening();
            return;
        }
        KeyCode::Char('V') => {
            app.cycle_voice();
            return;
        }
        _ => {}
    }

    match app.mode() {
        ViewMode::Welcome => handle_welcome(app, key),
        ViewMode::CategoryBrowser => handle_browser(app, key),
        ViewMode::Conversation => handle_conversation(app, key),
    }
}

fn handle_welcome(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.suggestion_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.suggestion_nav_up(),
        KeyCode::Enter => {
            app.activate_suggestion();
        }
        _ => {}
    }
}

fn handle_browser(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.browser_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.browser_nav_up(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            app.browser_activate();
        }
        KeyCode::Char('h') | KeyCode::Left => app.browser_collapse(),
        KeyCode::Tab => app.switch_browser_tab(),
        KeyCode::Esc => app.view.close_browser(),
        _ => {}
    }
}

fn handle_conversation(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.message_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.message_nav_up(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::Char('G') => app.scroll_to_bottom(),
        KeyCode::Char('g') => {
            app.chat_follow = false;
            app.chat_scroll = 0;
        }
        KeyCode::Char('o') | KeyCode::Enter => app.toggle_sources(),
        KeyCode::Char('s') => app.toggle_read_aloud(),
        KeyCode::Esc => app.selected_message = None,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('r') => app.toggle_listening(),
            KeyCode::Char('n') => app.new_chat(),
            KeyCode::Char('u') => {
                app.input.clear();
                app.input_cursor = 0;
            }
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.stop_listening();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            if app.submit_input() {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

/// Pasted text lands in the input box with newlines flattened.
fn insert_text(app: &mut App, text: &str) {
    let text: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
    app.input.insert_str(byte_pos, &text);
    app.input_cursor += text.chars().count();
    app.input_mode = InputMode::Editing;
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_main = app
        .main_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_main {
        return;
    }

    match (mouse.kind, app.mode()) {
        (MouseEventKind::ScrollDown, ViewMode::Conversation) => {
            for _ in 0..3 {
                app.scroll_down();
            }
        }
        (MouseEventKind::ScrollUp, ViewMode::Conversation) => {
            for _ in 0..3 {
                app.scroll_up();
            }
        }
        (MouseEventKind::ScrollDown, ViewMode::CategoryBrowser) => app.browser_nav_down(),
        (MouseEventKind::ScrollUp, ViewMode::CategoryBrowser) => app.browser_nav_up(),
        (MouseEventKind::ScrollDown, ViewMode::Welcome) => app.suggestion_nav_down(),
        (MouseEventKind::ScrollUp, ViewMode::Welcome) => app.suggestion_nav_up(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::serve_once;
    use crate::app::test_support::{settle, test_app};
    use pretty_assertions::assert_eq;

    fn press(app: &mut App, code: KeyCode) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))).unwrap();
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[tokio::test]
    async fn enter_while_typing_sends_and_leaves_insert_mode() {
        let (url, _server) = serve_once("200 OK", r#"{"answer":"a","sources":""}"#).await;
        let mut app = test_app(&url, 120);
        assert_eq!(app.input_mode, InputMode::Editing);

        type_text(&mut app, "Citizenship?");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.input, "");
        assert_eq!(app.conversation.messages()[0].content, "Citizenship?");
        assert!(app.conversation.is_pending());
        settle(&mut app).await;
    }

    #[test]
    fn enter_on_blank_input_stays_in_insert_mode() {
        let mut app = test_app("http://localhost:8000", 120);

        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.input_mode, InputMode::Editing);
        assert!(app.conversation.is_empty());
    }

    #[tokio::test]
    async fn n_starts_a_new_chat() {
        let (url, _server) = serve_once("200 OK", r#"{"answer":"a","sources":""}"#).await;
        let mut app = test_app(&url, 120);

        type_text(&mut app, "q");
        press(&mut app, KeyCode::Enter);
        settle(&mut app).await;
        assert_eq!(app.mode(), ViewMode::Conversation);

        press(&mut app, KeyCode::Char('n'));

        assert_eq!(app.mode(), ViewMode::Welcome);
        assert!(app.conversation.is_empty());
    }

    #[test]
    fn esc_closes_the_browser() {
        let mut app = test_app("http://localhost:8000", 120);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);

        press(&mut app, KeyCode::Char('b'));
        assert_eq!(app.mode(), ViewMode::CategoryBrowser);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode(), ViewMode::Welcome);
    }

    #[test]
    fn editing_keys_respect_multibyte_text() {
        let mut app = test_app("http://localhost:8000", 120);

        type_text(&mut app, "नेपाल");
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Home);
        type_text(&mut app, "x");

        assert_eq!(app.input, "xनेपल");
        assert_eq!(app.input_cursor, 1);
    }

    #[test]
    fn char_index_handles_devanagari() {
        let text = "नेपाल law";
        assert_eq!(char_to_byte_index(text, 0), 0);
        // न + े are two chars, three bytes each
        assert_eq!(char_to_byte_index(text, 2), 6);
        assert_eq!(char_to_byte_index(text, 100), text.len());
    }

    #[test]
    fn point_in_rect_excludes_far_edges() {
        let rect = Rect::new(2, 3, 4, 5);
        assert!(point_in_rect(2, 3, rect));
        assert!(point_in_rect(5, 7, rect));
        assert!(!point_in_rect(6, 3, rect));
        assert!(!point_in_rect(2, 8, rect));
    }
}
