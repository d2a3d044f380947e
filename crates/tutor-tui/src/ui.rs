use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use tutor_core::navigation::resolve_source_url;
use tutor_core::{ChatRole, ChatSession, NavbarView};

use crate::app::{App, FocusPane, InputMode, SigninField, ACTION_LABEL};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if end == 0 {
            break;
        }
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..end].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    app.document.viewport = area;

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.session.is_open() {
        let [lesson_area, chat_area] = Layout::horizontal([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_lesson(app, frame, lesson_area);
        render_chat_panel(app, frame, chat_area);
    } else {
        app.chat_area = None;
        app.input_area = None;
        render_lesson(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    if app.signin.is_some() {
        render_signin(app, frame, area);
    } else {
        render_selection_action(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Physical AI & Humanoid Robotics ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let navbar = match NavbarView::from_state(&app.auth, &app.config.site_base_url) {
        NavbarView::Hidden => Line::default(),
        NavbarView::SignedIn { name } => Line::from(vec![
            Span::styled(format!("Welcome, {} ", name), Style::default().fg(Color::Green)),
            Span::styled("[o] Sign Out ", Style::default().fg(Color::Gray)),
        ]),
        NavbarView::SignedOut { signin_path, signup_path } => Line::from(vec![
            Span::styled(format!("[s] Sign In ({}) ", signin_path), Style::default().fg(Color::Gray)),
            Span::styled(format!("Sign Up ({}) ", signup_path), Style::default().fg(Color::DarkGray)),
        ]),
    };

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
    frame.render_widget(Paragraph::new(navbar).right_aligned(), area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" READ ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" ASK ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let hints = if app.signin.is_some() {
        " Tab: next field  Enter: sign in  Esc: cancel"
    } else if app.input_mode == InputMode::Editing {
        " Enter: send  Esc: stop editing"
    } else if app.selection.pending().is_some() {
        " Enter/click: ask about selection  Esc: dismiss"
    } else {
        " drag/v: select  c: chat  i: ask  x: clear context  Tab: focus  q: quit"
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn render_lesson(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Lesson;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} ", app.document.title));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let doc = &mut app.document;
    doc.area = inner;
    doc.layout(inner.width as usize);

    let selection = doc.selection_range();
    let selected = Style::default().bg(Color::Blue).fg(Color::White);

    let lines: Vec<Line> = doc
        .rows()
        .enumerate()
        .skip(doc.scroll)
        .take(inner.height as usize)
        .map(|(row, text)| {
            let base = if focused && row == doc.cursor_row {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };

            let Some((start, end)) = selection.filter(|(s, e)| row >= s.row && row <= e.row) else {
                return Line::styled(text.to_string(), base);
            };

            let len = text.chars().count();
            let from = if row == start.row { start.col.min(len) } else { 0 };
            let to = if row == end.row { end.col.min(len) } else { len };
            let before: String = text.chars().take(from).collect();
            let middle: String = text.chars().skip(from).take(to.saturating_sub(from)).collect();
            let after: String = text.chars().skip(to).collect();
            Line::from(vec![
                Span::styled(before, base),
                Span::styled(middle, selected),
                Span::styled(after, base),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_chat_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let context = app.session.pinned_context().to_string();
    let context_height = if context.is_empty() {
        0
    } else {
        let width = area.width.saturating_sub(2).max(1) as usize;
        let lines = (context.chars().count() / width + 1).min(4) as u16;
        lines + 2
    };

    let [context_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(context_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store areas for mouse hit-testing
    app.chat_area = Some(chat_area);
    app.input_area = Some(input_area);

    // Inner size minus borders, for scroll calculations
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    if context_height > 0 {
        let card = Paragraph::new(context)
            .style(Style::default().fg(Color::Gray).italic())
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Magenta))
                    .title(" Selected text (x to clear) "),
            );
        frame.render_widget(card, context_area);
    }

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Study Assistant ");

    let loading = app.session.is_loading();
    let lines = if app.session.messages().is_empty() && !loading {
        vec![Line::from(Span::styled(
            "Hi! Ask me anything about the textbook, or select a passage and choose \"Ask about this\".",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        chat_lines(app)
    };

    // Follow the newest message unless the reader scrolled away
    let total = estimated_height(&lines, app.chat_width as usize);
    let max_scroll = total.saturating_sub(app.chat_height);
    if app.follow_chat || app.chat_scroll > max_scroll {
        app.chat_scroll = max_scroll;
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn chat_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();
    let messages = app.session.messages();
    let loading = app.session.is_loading();

    for msg in messages {
        // The streaming answer shows as "Thinking" until it has text
        if loading && msg.role == ChatRole::Assistant && msg.content.is_empty() {
            continue;
        }

        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.clone()));
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "Tutor:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                let style = if msg.error {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                };
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line).patch_style(style));
                }

                let sources = ChatSession::visible_sources(msg);
                if !sources.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "Sources:",
                        Style::default().fg(Color::Magenta),
                    )));
                    for source in sources {
                        let url = resolve_source_url(&app.config.site_base_url, &source.url);
                        lines.push(Line::from(vec![
                            Span::raw(format!("  • {}", source.label())),
                            Span::styled(format!(" → {}", url), Style::default().fg(Color::DarkGray)),
                        ]));
                    }
                }
            }
        }
        lines.push(Line::default());
    }

    let streaming_text = messages
        .last()
        .is_some_and(|m| m.role == ChatRole::Assistant && !m.content.is_empty());
    if loading && !streaming_text {
        lines.push(Line::from(Span::styled(
            "Tutor:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Rows the lines take once wrapped to `width`.
fn estimated_height(lines: &[Line], width: usize) -> u16 {
    let width = width.max(1);
    lines
        .iter()
        .map(|line| {
            // Character count, not byte length
            let chars: usize = line.spans.iter().map(|s| s.content.chars().count()).sum();
            (chars.saturating_sub(1) / width + 1) as u16
        })
        .sum()
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask (i to type) ");

    // Horizontal scrolling keeps the cursor visible
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input_text = app.session.input();
    let paragraph = if input_text.is_empty() && !editing {
        Paragraph::new(app.session.placeholder()).style(Style::default().fg(Color::DarkGray))
    } else {
        let visible_text: String = input_text
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };

    frame.render_widget(paragraph.block(input_block), area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_selection_action(app: &App, frame: &mut Frame, area: Rect) {
    let Some(pending) = app.selection.pending() else {
        return;
    };

    let width = ACTION_LABEL.chars().count() as u16;
    let x = (pending.anchor.x.max(0.0) as u16).min(area.width.saturating_sub(width));
    let y = (pending.anchor.y.max(0.0) as u16).min(area.height.saturating_sub(1));
    let button_area = Rect::new(x, y, width.min(area.width), 1);

    frame.render_widget(Clear, button_area);
    let button = Paragraph::new(ACTION_LABEL)
        .style(Style::default().bg(Color::Green).fg(Color::Black).add_modifier(Modifier::BOLD));
    frame.render_widget(button, button_area);
}

fn render_signin(app: &App, frame: &mut Frame, area: Rect) {
    let Some(form) = app.signin.as_ref() else {
        return;
    };

    // Calculate popup size and position (centered)
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = 8;
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Sign In ");
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let field_style = |field: SigninField| {
        if form.field == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        }
    };

    let email = Line::from(vec![
        Span::styled("Email:    ", field_style(SigninField::Email)),
        Span::raw(form.email.clone()),
    ]);
    // Mask the password
    let password = Line::from(vec![
        Span::styled("Password: ", field_style(SigninField::Password)),
        Span::raw("*".repeat(form.password.chars().count())),
    ]);
    let status = match &app.auth.error {
        Some(err) => Line::from(Span::styled(err.clone(), Style::default().fg(Color::Red))),
        None => Line::from(Span::styled(
            "Enter to continue, Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    };

    frame.render_widget(
        Paragraph::new(vec![email, Line::default(), password, Line::default(), status]),
        inner,
    );

    let (row, value) = match form.field {
        SigninField::Email => (0, form.email.chars().count()),
        SigninField::Password => (2, form.password.chars().count()),
    };
    let cursor_x = (10 + value as u16).min(inner.width.saturating_sub(1));
    frame.set_cursor_position((inner.x + cursor_x, inner.y + row));
}
