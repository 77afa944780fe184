use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, BrowserRow, BrowserTab, InputMode};
use crate::categories::SUGGESTIONS;
use crate::conversation::Role;
use crate::markdown::{self, Inline};
use crate::view::ViewMode;

const SIDEBAR_WIDTH: u16 = 30;
const DISCLAIMER: &str =
    "This AI can make mistakes. This is information, not advice; consult a lawyer if needed.";

fn inline_spans(inlines: &[Inline], base: Style) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for inline in inlines {
        match inline {
            Inline::Text(text) => spans.push(Span::styled(text.clone(), base)),
            Inline::Bold(text) => {
                spans.push(Span::styled(text.clone(), base.add_modifier(Modifier::BOLD)))
            }
            Inline::Italic(text) => {
                spans.push(Span::styled(text.clone(), base.add_modifier(Modifier::ITALIC)))
            }
            Inline::Code(text) => spans.push(Span::styled(text.clone(), base.fg(Color::Yellow))),
            Inline::Link { text, url } => {
                spans.push(Span::styled(
                    text.clone(),
                    base.fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                ));
                spans.push(Span::styled(format!(" ({})", url), Style::default().fg(Color::DarkGray)));
            }
        }
    }
    spans
}

/// Turn an answer into styled lines, one block at a time.
fn markdown_lines(content: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let blocks = markdown::parse_blocks(content);

    for (i, block) in blocks.iter().enumerate() {
        match block {
            markdown::Block::Paragraph(inlines) => {
                lines.push(Line::from(inline_spans(inlines, Style::default())));
            }
            markdown::Block::Heading { level, content } => {
                let mut style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
                if *level == 1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                lines.push(Line::from(inline_spans(content, style)));
            }
            markdown::Block::ListItem(inlines) => {
                let mut spans = vec![Span::styled("  • ", Style::default().fg(Color::Cyan))];
                spans.extend(inline_spans(inlines, Style::default()));
                lines.push(Line::from(spans));
            }
            markdown::Block::Code { language, lines: code } => {
                if let Some(language) = language {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", language),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                for line in code {
                    lines.push(Line::from(vec![
                        Span::styled("  │ ", Style::default().fg(Color::DarkGray)),
                        Span::styled(line.clone(), Style::default().fg(Color::Yellow)),
                    ]));
                }
            }
            markdown::Block::Blockquote(inlines) => {
                let mut spans = vec![Span::styled("  ▎ ", Style::default().fg(Color::DarkGray))];
                spans.extend(inline_spans(
                    inlines,
                    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
                ));
                lines.push(Line::from(spans));
            }
        }

        // List items stay tight; everything else gets a gap
        let tight = matches!(
            (block, blocks.get(i + 1)),
            (markdown::Block::ListItem(_), Some(markdown::Block::ListItem(_)))
        );
        if !tight && i + 1 < blocks.len() {
            lines.push(Line::default());
        }
    }

    lines
}

/// Sources are markdown too; drawn indented under their answer.
fn sources_lines(sources: &str) -> Vec<Line<'static>> {
    markdown_lines(sources)
        .into_iter()
        .map(|line| {
            let mut spans = vec![Span::raw("  ")];
            spans.extend(line.spans.into_iter().map(|span| {
                let style = Style::default().fg(Color::Gray).patch(span.style);
                Span::styled(span.content, style)
            }));
            Line::from(spans)
        })
        .collect()
}

/// Rows a set of lines occupies once wrapped to `width`.
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, input, disclaimer, footer
    let [header_area, body_area, input_area, disclaimer_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let sidebar_open = app.view.sidebar_open();
    let compact = app.view.is_compact();

    // Compact terminals draw the sidebar over the main panel
    let (sidebar_area, main_area) = if sidebar_open && !compact {
        let [sidebar, main] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
                .areas(body_area);
        (Some(sidebar), main)
    } else if sidebar_open {
        let width = SIDEBAR_WIDTH.min(body_area.width);
        (Some(Rect { width, ..body_area }), body_area)
    } else {
        (None, body_area)
    };

    app.main_area = Some(main_area);

    match app.mode() {
        ViewMode::Welcome => render_welcome(app, frame, main_area),
        ViewMode::CategoryBrowser => render_browser(app, frame, main_area),
        ViewMode::Conversation => render_conversation(app, frame, main_area),
    }

    if let Some(sidebar_area) = sidebar_area {
        if compact {
            frame.render_widget(Clear, sidebar_area);
        }
        render_sidebar(app, frame, sidebar_area);
    }

    render_input(app, frame, input_area);

    let disclaimer = Paragraph::new(DISCLAIMER)
        .style(Style::default().fg(Color::DarkGray))
        .centered();
    frame.render_widget(disclaimer, disclaimer_area);

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (health_text, health_color) = match app.api_healthy {
        Some(true) => ("● online", Color::Green),
        Some(false) => ("● offline", Color::Red),
        None => ("○ checking", Color::Gray),
    };

    let mut spans = vec![
        Span::styled(" Nyaya ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("न्याय ", Style::default().fg(Color::White)),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(health_text, Style::default().fg(health_color)),
    ];

    if app.voice_input.is_listening() {
        spans.push(Span::styled("  ● listening", Style::default().fg(Color::Red).bold()));
    }
    if app.voice_output.is_speaking() {
        spans.push(Span::styled("  ♪ speaking", Style::default().fg(Color::Magenta)));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Nyaya ");

    let heading = Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::from(vec![Span::styled(" n ", dim), Span::raw("New chat")]),
        Line::from(vec![Span::styled(" b ", dim), Span::raw("Browse topics")]),
        Line::default(),
        Line::from(Span::styled("Current session", heading)),
    ];

    let questions: Vec<&str> = app
        .conversation
        .messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();

    if questions.is_empty() {
        lines.push(Line::from(Span::styled("No questions yet", dim)));
    }
    let inner_width = area.width.saturating_sub(4) as usize;
    for question in questions.iter().rev().take(10) {
        let mut label: String = question.chars().take(inner_width).collect();
        if question.chars().count() > inner_width && inner_width > 1 {
            label.pop();
            label.push('…');
        }
        lines.push(Line::from(format!("› {}", label)));
    }

    lines.push(Line::default());
    lines.push(Line::from(Span::styled("Status", heading)));

    let api_status = match app.api_healthy {
        Some(true) => Span::styled("online", Style::default().fg(Color::Green)),
        Some(false) => Span::styled("offline", Style::default().fg(Color::Red)),
        None => Span::styled("checking", dim),
    };
    lines.push(Line::from(vec![Span::raw("API    "), api_status]));

    let voice = if !app.voice_output.is_supported() {
        "unavailable".to_string()
    } else {
        let name = app
            .voice_output
            .selected_voice()
            .map(|v| v.name.clone())
            .unwrap_or_else(|| "default".to_string());
        match app.voice_output.voices().len() {
            0 | 1 => name,
            count => format!("{} (of {})", name, count),
        }
    };
    lines.push(Line::from(vec![Span::raw("Voice  "), Span::styled(voice, dim)]));

    let mic = if !app.voice_input.is_supported() {
        "unavailable"
    } else if app.voice_input.is_listening() {
        "listening"
    } else {
        "ready"
    };
    lines.push(Line::from(vec![Span::raw("Mic    "), Span::styled(mic, dim)]));

    let sidebar = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(sidebar, area);
}

fn render_welcome(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [intro_area, list_area] =
        Layout::vertical([Constraint::Length(5), Constraint::Min(0)]).areas(inner);

    let intro = Paragraph::new(vec![
        Line::default(),
        Line::from(Span::styled(
            "Namaste! How can I help with Nepali law today?",
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::from(Span::styled(
            "Ask about the constitution, acts and government services.",
            Style::default().fg(Color::Gray),
        )),
        Line::from(Span::styled(
            "Pick a suggestion, press b to browse topics, or i to type.",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .centered();
    frame.render_widget(intro, intro_area);

    let items: Vec<ListItem> = SUGGESTIONS
        .iter()
        .map(|s| {
            ListItem::new(vec![
                Line::from(Span::styled(s.title, Style::default().add_modifier(Modifier::BOLD))),
                Line::from(Span::styled(format!("  {}", s.text), Style::default().fg(Color::Gray))),
            ])
        })
        .collect();

    let list = List::new(items)
        .highlight_style(Style::default().fg(Color::Cyan))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.suggestion_state);
}

fn render_browser(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Browse (Tab to switch, Esc to close) ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [tabs_area, list_area] =
        Layout::vertical([Constraint::Length(2), Constraint::Min(0)]).areas(inner);

    let selected_tab = match app.browser_tab {
        BrowserTab::Topics => 0,
        BrowserTab::Services => 1,
    };
    let tabs = Tabs::new(vec![
        "Topics".to_string(),
        format!("Services ({})", app.services.total()),
    ])
    .select(selected_tab)
    .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, tabs_area);

    let rows = app.browser_rows();
    if rows.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No service directory found. Set services_path in config.json.",
            Style::default().fg(Color::DarkGray),
        ));
        frame.render_widget(empty, list_area);
        return;
    }

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| match row {
            BrowserRow::TopicCategory { index, expanded } => {
                let category = &app.topics[*index];
                ListItem::new(Line::from(vec![
                    Span::raw(if *expanded { "▾ " } else { "▸ " }),
                    Span::styled(category.title.clone(), Style::default().bold()),
                    Span::styled(
                        format!("  {}", category.localized_title),
                        Style::default().fg(Color::Gray),
                    ),
                ]))
            }
            BrowserRow::Topic { category, index } => {
                let topic = &app.topics[*category].subcategories[*index];
                ListItem::new(Line::from(vec![
                    Span::raw("    "),
                    Span::raw(topic.title.clone()),
                    Span::styled(
                        format!("  {}", topic.localized_text),
                        Style::default().fg(Color::DarkGray),
                    ),
                ]))
            }
            BrowserRow::ServiceCategory { name, count, expanded } => {
                ListItem::new(Line::from(vec![
                    Span::raw(if *expanded { "▾ " } else { "▸ " }),
                    Span::styled(name.clone(), Style::default().bold()),
                    Span::styled(format!("  ({})", count), Style::default().fg(Color::Gray)),
                ]))
            }
            BrowserRow::Service { category, index } => {
                let name = app
                    .services
                    .services_in(category)
                    .get(*index)
                    .map(|s| s.service_name.clone())
                    .unwrap_or_default();
                ListItem::new(Line::from(vec![Span::raw("    "), Span::raw(name)]))
            }
        })
        .collect();

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::Cyan)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.browser_state);
}

fn render_conversation(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let inner_width = area.width.saturating_sub(2);
    app.chat_height = area.height.saturating_sub(2);

    let mut lines: Vec<Line> = Vec::new();

    for (i, msg) in app.conversation.messages().iter().enumerate() {
        let selected = app.selected_message == Some(i);
        let marker = if selected { "▌" } else { " " };

        match msg.role {
            Role::User => {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Cyan)),
                    Span::styled("You:", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                ]));
                lines.push(Line::from(msg.content.clone()));
            }
            Role::Assistant => {
                lines.push(Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Yellow)),
                    Span::styled(
                        "Nyaya:",
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ),
                ]));
                lines.extend(markdown_lines(&msg.content));

                if let Some(sources) = msg.visible_sources() {
                    if app.expanded_sources.contains(&i) {
                        lines.push(Line::from(Span::styled(
                            "▾ Sources",
                            Style::default().fg(Color::Magenta),
                        )));
                        lines.extend(sources_lines(sources));
                    } else {
                        lines.push(Line::from(Span::styled(
                            "▸ Sources (o to show)",
                            Style::default().fg(Color::Magenta),
                        )));
                    }
                }
            }
        }
        lines.push(Line::default());
    }

    if app.conversation.is_pending() {
        lines.push(Line::from(Span::styled(
            " Nyaya:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let max_scroll = wrapped_height(&lines, inner_width).saturating_sub(app.chat_height);
    if app.chat_follow || app.chat_scroll >= max_scroll {
        app.chat_scroll = max_scroll;
        app.chat_follow = true;
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let pending = app.conversation.is_pending();
    let editing = app.input_mode == InputMode::Editing;

    let border_color = if pending {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let title = if app.voice_input.is_listening() {
        " Listening... (Ctrl+R to stop) "
    } else if pending {
        " Waiting for answer... "
    } else {
        " Ask a legal question "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let (text, style) = if app.input.is_empty() && !editing {
        (
            "Press i to type your question".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        let visible: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();
        let color = if pending { Color::DarkGray } else { Color::Cyan };
        (visible, Style::default().fg(color))
    };

    frame.render_widget(Paragraph::new(text).style(style).block(block), area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [Span::styled(key, key_style), Span::styled(label, label_style)]
    };

    let mut hints: Vec<Span> = vec![Span::styled(mode_text, mode_style)];

    if let Some(status) = &app.status {
        hints.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Yellow)));
        frame.render_widget(Paragraph::new(Line::from(hints)), area);
        return;
    }

    match app.input_mode {
        InputMode::Editing => {
            hints.extend(hint(" Enter ", " send "));
            hints.extend(hint(" Esc ", " normal "));
            if app.voice_input.is_supported() {
                hints.extend(hint(" C-r ", " voice "));
            }
        }
        InputMode::Normal => {
            match app.mode() {
                ViewMode::Welcome => {
                    hints.extend(hint(" j/k ", " nav "));
                    hints.extend(hint(" Enter ", " ask "));
                }
                ViewMode::CategoryBrowser => {
                    hints.extend(hint(" j/k ", " nav "));
                    hints.extend(hint(" Enter ", " open "));
                    hints.extend(hint(" h ", " collapse "));
                    hints.extend(hint(" Tab ", " tab "));
                }
                ViewMode::Conversation => {
                    hints.extend(hint(" j/k ", " message "));
                    hints.extend(hint(" o ", " sources "));
                    if app.voice_output.is_supported() {
                        let label = if app.voice_output.is_speaking() { " stop " } else { " read " };
                        hints.extend([Span::styled(" s ", key_style), Span::styled(label, label_style)]);
                    }
                }
            }
            hints.extend(hint(" i ", " type "));
            if app.voice_input.is_supported() {
                hints.extend(hint(" v ", " voice "));
            }
            if app.voice_output.is_supported() {
                hints.extend(hint(" V ", " next voice "));
            }
            hints.extend(hint(" n ", " new "));
            hints.extend(hint(" b ", " browse "));
            hints.extend(hint(" [ ", " sidebar "));
            hints.extend(hint(" q ", " quit "));
        }
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn answer_blocks_become_lines() {
        let lines = markdown_lines("# Rights\n\n- **Equality**\n- Freedom\n\nSee `Art. 18`.");
        let text: Vec<String> = lines.iter().map(plain).collect();

        assert_eq!(
            text,
            vec!["Rights", "", "  • Equality", "  • Freedom", "", "See Art. 18."]
        );
        assert!(lines[2].spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn links_show_their_target() {
        let lines = markdown_lines("[Act](https://lawcommission.gov.np)");
        assert_eq!(plain(&lines[0]), "Act (https://lawcommission.gov.np)");
    }

    #[test]
    fn sources_render_as_markdown() {
        let lines = sources_lines("**Constitution of Nepal**\n\n- Art. 16\n- Art. 17");
        let text: Vec<String> = lines.iter().map(plain).collect();

        assert_eq!(
            text,
            vec!["  Constitution of Nepal", "  ", "    • Art. 16", "    • Art. 17"]
        );
        assert!(lines[0].spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn wrapped_height_counts_overflow_rows() {
        let lines = vec![Line::from("abcdefghij"), Line::default(), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 4), 3 + 1 + 1);
        assert_eq!(wrapped_height(&lines, 0), 10 + 1 + 3);
    }
}
