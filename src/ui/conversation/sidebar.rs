use crate::session::{ChatSession, ConversationId};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

/// One row of the "Previous Chats" list
#[derive(Debug, Clone, PartialEq)]
pub struct SidebarEntry {
    pub id: ConversationId,
    pub name: String,
    pub selected: bool,
}

/// Rows in display order, newest first
pub fn sidebar_entries(session: &ChatSession) -> Vec<SidebarEntry> {
    let selected = session.selected_id();
    session
        .conversations_newest_first()
        .map(|conversation| SidebarEntry {
            id: conversation.id(),
            name: conversation.name(),
            selected: Some(conversation.id()) == selected,
        })
        .collect()
}

/// Sidebar with session controls and the chat list
pub struct Sidebar<'a> {
    pub entries: &'a [SidebarEntry],
    pub cursor: usize,
    pub has_focus: bool,
    pub model: &'a str,
    pub has_api_key: bool,
}

impl Widget for Sidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let border = if self.has_focus { Color::Green } else { Color::Gray };
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Chats")
            .style(Style::default().fg(border));
        let inner = block.inner(area);
        block.render(area, buf);

        let key_status = if self.has_api_key {
            Span::styled("API key: set", Style::default().fg(Color::Green))
        } else {
            Span::styled("API key: missing (Ctrl+K)", Style::default().fg(Color::Yellow))
        };

        let mut lines = vec![
            Line::from(key_status),
            Line::from(vec![
                Span::styled("Model: ", Style::default().fg(Color::DarkGray)),
                Span::raw(self.model.to_string()),
            ]),
            Line::default(),
            Line::from(Span::styled("[n] New Chat", Style::default().fg(Color::Cyan))),
            Line::from(Span::styled("[c] Clear All Chats", Style::default().fg(Color::Cyan))),
            Line::default(),
            Line::from(Span::styled("Previous Chats:", Style::default().add_modifier(Modifier::BOLD))),
        ];

        for (index, entry) in self.entries.iter().enumerate() {
            let marker = if entry.selected { "▶ " } else { "  " };
            let mut style = Style::default().fg(Color::White);
            if entry.selected {
                style = style.add_modifier(Modifier::BOLD);
            }
            if self.has_focus && index == self.cursor {
                style = style.fg(Color::Black).bg(Color::Cyan);
            }
            lines.push(Line::from(vec![
                Span::raw(marker),
                Span::styled(entry.name.clone(), style),
            ]));
        }

        let height = inner.height as usize;
        // keep the cursor row on screen
        let header = 7;
        let start = if self.has_focus {
            (header + self.cursor + 1).saturating_sub(height)
        } else {
            0
        };
        for (row, line) in lines.iter().skip(start).take(height).enumerate() {
            buf.set_line(inner.x, inner.y + row as u16, line, inner.width);
        }
    }
}
