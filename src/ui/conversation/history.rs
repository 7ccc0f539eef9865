//! Transcript display for the selected conversation

use crate::session::{Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// Borrowed view over a conversation transcript plus the in-flight reply
pub struct ConversationHistory<'a> {
    messages: &'a [Message],
    streaming_message: Option<&'a str>,
    title: String,
    empty_hint: &'a str,
}

impl<'a> ConversationHistory<'a> {
    pub fn new(messages: &'a [Message], title: impl Into<String>) -> Self {
        Self {
            messages,
            streaming_message: None,
            title: title.into(),
            empty_hint: "",
        }
    }

    /// Partial assistant reply, drawn after the last message with a cursor
    pub fn streaming(mut self, partial: Option<&'a str>) -> Self {
        self.streaming_message = partial;
        self
    }

    pub fn empty_hint(mut self, hint: &'a str) -> Self {
        self.empty_hint = hint;
        self
    }

    /// Render a single message into lines
    fn render_message(&self, message: &Message, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        let label = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        let timestamp = message.sent_at.format("%H:%M:%S").to_string();
        lines.push(Line::from(vec![Span::styled(
            format!("{label} · {timestamp}"),
            Style::default().fg(Color::DarkGray),
        )]));

        for content_line in wrap_text(&message.content, width.saturating_sub(2) as usize) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(content_line, content_style(message.role)),
            ]));
        }

        lines
    }

    /// Render the streaming reply with a typing cursor
    fn render_streaming_message(&self, text: &str, width: u16) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(vec![Span::styled(
            "Assistant · typing",
            Style::default().fg(Color::DarkGray),
        )])];

        let content_lines = wrap_text(text, width.saturating_sub(3) as usize);
        let last = content_lines.len().saturating_sub(1);
        for (i, content_line) in content_lines.into_iter().enumerate() {
            let cursor = if i == last { "▌" } else { "" };
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(content_line, content_style(Role::Assistant)),
                Span::styled(cursor, Style::default().fg(Color::Yellow)),
            ]));
        }

        lines
    }
}

impl Widget for ConversationHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(self.title.as_str());

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() && self.streaming_message.is_none() {
            let hint = Line::from(vec![Span::styled(self.empty_hint, Style::default().fg(Color::Gray))]);
            buf.set_line(inner_area.x, inner_area.y, &hint, inner_area.width);
            return;
        }

        let mut all_lines: Vec<Line> = Vec::new();
        for message in self.messages {
            all_lines.extend(self.render_message(message, inner_area.width));
            all_lines.push(Line::default());
        }
        if let Some(text) = self.streaming_message {
            all_lines.extend(self.render_streaming_message(text, inner_area.width));
        }

        // stick to the bottom, newest lines win
        let height = inner_area.height as usize;
        let start = all_lines.len().saturating_sub(height);
        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default().fg(Color::Green),
        Role::System => Style::default().fg(Color::Yellow),
    }
}

/// Greedy word wrap that keeps explicit line breaks and splits overlong words
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }

        lines.push(current);
    }

    lines
}
