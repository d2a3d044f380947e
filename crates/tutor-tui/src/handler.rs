use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tutor_core::selection::{Gesture, Point};

use crate::app::{App, FocusPane, InputMode, SigninField};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        // Layout is recomputed on the next draw
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.signin.is_some() {
        handle_signin_key(app, key).await;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Esc => {
            if app.selection.pending().is_some() {
                app.selection.dismiss();
            } else {
                app.document.clear();
                app.document.selecting = false;
            }
        }

        // Chat panel
        KeyCode::Char('c') => app.toggle_chat(),
        KeyCode::Char('x') => app.session.clear_context(),
        KeyCode::Char('i') => {
            if app.session.is_open() {
                app.focus = FocusPane::Chat;
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Lesson if app.session.is_open() => FocusPane::Chat,
                _ => FocusPane::Lesson,
            };
        }

        // Auth
        KeyCode::Char('s') => app.open_signin(),
        KeyCode::Char('o') => app.signout().await,

        // Selection
        KeyCode::Enter => {
            if app.selection.pending().is_some() {
                app.confirm_selection();
            } else if app.focus == FocusPane::Chat {
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Char('v') if app.focus == FocusPane::Lesson => {
            if app.document.toggle_row_selection() {
                app.finish_selection_gesture(Gesture::KeyUp);
            } else {
                app.selection.dismiss();
            }
        }

        // Movement
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::Lesson => app.document.cursor_down(),
            FocusPane::Chat => app.scroll_chat_down(1),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::Lesson => app.document.cursor_up(),
            FocusPane::Chat => app.scroll_chat_up(1),
        },
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            scroll_half_page(app, true);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            scroll_half_page(app, false);
        }
        KeyCode::PageDown => scroll_half_page(app, true),
        KeyCode::PageUp => scroll_half_page(app, false),
        KeyCode::Char('g') => match app.focus {
            FocusPane::Lesson => {
                app.document.scroll = 0;
                app.document.cursor_row = 0;
            }
            FocusPane::Chat => app.scroll_chat_up(u16::MAX),
        },
        KeyCode::Char('G') => match app.focus {
            FocusPane::Lesson => {
                let last = app.document.row_count().saturating_sub(1);
                app.document.cursor_row = last;
                app.document.scroll_down(last);
            }
            FocusPane::Chat => app.follow_chat = true,
        },
        _ => {}
    }
}

fn scroll_half_page(app: &mut App, down: bool) {
    match app.focus {
        FocusPane::Lesson => {
            let half = (app.document.area.height / 2).max(1) as usize;
            if down {
                app.document.scroll_down(half);
            } else {
                app.document.scroll_up(half);
            }
        }
        FocusPane::Chat => {
            let half = (app.chat_height / 2).max(1);
            if down {
                app.scroll_chat_down(half);
            } else {
                app.scroll_chat_up(half);
            }
        }
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_question(),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let input = app.session.input_mut();
                let byte_pos = char_to_byte_index(input, app.input_cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let input = app.session.input_mut();
            if app.input_cursor < input.chars().count() {
                let byte_pos = char_to_byte_index(input, app.input_cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.session.input().chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.session.input().chars().count();
        }
        KeyCode::Char(c) => {
            let input = app.session.input_mut();
            let byte_pos = char_to_byte_index(input, app.input_cursor);
            input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

async fn handle_signin_key(app: &mut App, key: KeyEvent) {
    let Some(form) = app.signin.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc => app.signin = None,
        KeyCode::Tab | KeyCode::Down | KeyCode::Up => {
            form.field = match form.field {
                SigninField::Email => SigninField::Password,
                SigninField::Password => SigninField::Email,
            };
        }
        KeyCode::Enter => match form.field {
            SigninField::Email => form.field = SigninField::Password,
            SigninField::Password => app.submit_signin().await,
        },
        KeyCode::Backspace => {
            form.active_mut().pop();
        }
        KeyCode::Char(c) => form.active_mut().push(c),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_lesson = point_in_rect(x, y, app.document.area);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_input = app.input_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if app.selection.pending().is_some() {
                let at = Point {
                    x: x as f64,
                    y: y as f64,
                };
                if let Some(event) = app.selection.on_click(at, &mut app.document, Instant::now()) {
                    app.accept_selection(event);
                    return;
                }
                if app.selection.pending().is_some() {
                    // Still inside the guard window
                    return;
                }
            }

            if let Some(pos) = app.document.pos_at(x, y) {
                app.document.begin_drag(pos);
                app.dragging = true;
                app.focus = FocusPane::Lesson;
                app.input_mode = InputMode::Normal;
            } else if in_input {
                app.focus = FocusPane::Chat;
                app.input_mode = InputMode::Editing;
            } else if in_chat {
                app.focus = FocusPane::Chat;
            }
        }
        MouseEventKind::Drag(MouseButton::Left) if app.dragging => {
            if let Some(pos) = app.document.pos_at(x, y) {
                app.document.extend_drag(pos);
            }
        }
        MouseEventKind::Up(MouseButton::Left) if app.dragging => {
            app.dragging = false;
            app.finish_selection_gesture(Gesture::PointerUp);
        }
        MouseEventKind::ScrollDown => {
            if in_lesson {
                app.document.scroll_down(3);
            } else if in_chat {
                app.scroll_chat_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_lesson {
                app.document.scroll_up(3);
            } else if in_chat {
                app.scroll_chat_up(3);
            }
        }
        _ => {}
    }
}
