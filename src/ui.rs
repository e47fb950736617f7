use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};
use regex::Regex;

use crate::app::{App, InputMode};
use crate::chat::ChatRole;
use crate::format::{split_segments, Segment};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, transcript, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" minichat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" {} ", app.client.base_url()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");

    let inner_area = block.inner(area);
    app.chat_area = Some(area);
    app.chat_height = inner_area.height;
    app.chat_width = inner_area.width;

    let lines = transcript_lines(app);
    app.total_chat_lines = lines.len() as u16;

    let transcript = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(transcript, area);

    if app.total_chat_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(app.total_chat_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

/// Build the full transcript as styled lines: completed turns, then the
/// in-flight reply and typing indicator while a request is outstanding.
pub fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut block_idx = 0usize;

    for msg in &app.messages {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            ChatRole::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                )));
                push_body_lines(app, &msg.content, &mut block_idx, &mut lines);
                lines.push(Line::default());
            }
        }
    }

    if app.busy {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        if !app.stream_buffer.is_empty() {
            push_body_lines(app, &app.stream_buffer, &mut block_idx, &mut lines);
        }
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Typing{}", dots),
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Render one message body: plain text with highlighted links, fenced code
/// as an indented block under a language-labeled header. `block_idx` runs
/// across the whole transcript so headers match the copy-selection keys.
fn push_body_lines(app: &App, content: &str, block_idx: &mut usize, lines: &mut Vec<Line<'static>>) {
    for segment in split_segments(content) {
        match segment {
            Segment::Text(text) => {
                for line in text.lines() {
                    lines.push(text_line(line));
                }
            }
            Segment::Code { lang, code } => {
                let selected = app.selected_block == Some(*block_idx);
                let header_style = if selected {
                    Style::default()
                        .bg(Color::Blue)
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Magenta)
                };

                let mut header_spans = vec![Span::styled(
                    format!("[{}] {} ", *block_idx + 1, lang),
                    header_style,
                )];
                if selected && app.copy_feedback.is_some() {
                    header_spans.push(Span::styled(
                        " Copied! ",
                        Style::default()
                            .fg(Color::Green)
                            .add_modifier(Modifier::BOLD),
                    ));
                }
                lines.push(Line::from(header_spans));

                for line in code.lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", line),
                        Style::default().fg(Color::Green),
                    )));
                }

                *block_idx += 1;
            }
        }
    }
}

/// A plain-text line with http(s) URLs underlined, mirroring the clickable
/// anchors of the HTML rendering.
fn text_line(line: &str) -> Line<'static> {
    let url_regex = Regex::new(r#"https?://[^\s<>"]+"#).unwrap();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut last = 0;

    for m in url_regex.find_iter(line) {
        if m.start() > last {
            spans.push(Span::raw(line[last..m.start()].to_string()));
        }
        spans.push(Span::styled(
            m.as_str().to_string(),
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::UNDERLINED),
        ));
        last = m.end();
    }
    if last < line.len() {
        spans.push(Span::raw(line[last..].to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.busy {
        Color::DarkGray
    } else if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if app.busy {
        " Message (waiting for reply) "
    } else {
        " Message (Enter to send) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor visible in a single-line input
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && !app.busy {
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
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " TYPE ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" [/] ", key_style),
            Span::styled(" block ", label_style),
            Span::styled(" c ", key_style),
            Span::styled(" copy ", label_style),
            Span::styled(" S ", key_style),
            Span::styled(" export ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::styled(" ", label_style)];
    spans.extend(hints);

    if let Some((notice, _)) = &app.notice {
        spans.push(Span::styled(
            format!("  {} ", notice),
            Style::default().bg(Color::Black).fg(Color::Green),
        ));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::config::Config;
    use tokio::sync::mpsc;

    fn test_app() -> App {
        let (tx, _rx) = mpsc::unbounded_channel();
        App::new(Config::new(), tx)
    }

    fn rendered(lines: &[Line<'static>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| {
                l.spans
                    .iter()
                    .map(|s| s.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn typing_indicator_appears_while_busy() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();

        let text = rendered(&transcript_lines(&app));
        assert!(text.iter().any(|l| l.starts_with("Typing.")));
    }

    #[test]
    fn in_flight_reply_renders_before_completion() {
        let mut app = test_app();
        app.input = "hi".to_string();
        app.begin_submit().unwrap();
        app.apply_delta("partial reply");

        let text = rendered(&transcript_lines(&app));
        assert!(text.iter().any(|l| l == "partial reply"));
    }

    #[test]
    fn code_blocks_get_numbered_headers() {
        let mut app = test_app();
        app.messages
            .push(ChatMessage::assistant("```rust\nfn main() {}\n```"));

        let text = rendered(&transcript_lines(&app));
        assert!(text.iter().any(|l| l.starts_with("[1] rust")));
        assert!(text.iter().any(|l| l.contains("fn main() {}")));
    }

    #[test]
    fn role_labels_precede_messages() {
        let mut app = test_app();
        app.messages.push(ChatMessage::user("question"));

        let text = rendered(&transcript_lines(&app));
        assert_eq!(text[0], "AI:"); // seeded greeting
        assert!(text.iter().any(|l| l == "You:"));
    }
}
