use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusType {
    Info,
    Success,
    Warning,
    Error,
}

/// One-line feedback shown under the composer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusType,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self { kind: StatusType::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { kind: StatusType::Success, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { kind: StatusType::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: StatusType::Error, text: text.into() }
    }

    pub fn to_line(&self) -> Line<'static> {
        create_status_line(&self.text, self.kind)
    }
}

/// Helper to create status lines
pub fn create_status_line(message: &str, status: StatusType) -> Line<'static> {
    let (prefix, color) = match status {
        StatusType::Info => ("info: ", Color::Blue),
        StatusType::Success => ("ok: ", Color::Green),
        StatusType::Warning => ("warning: ", Color::Yellow),
        StatusType::Error => ("Error: ", Color::Red),
    };
    Line::from(vec![
        Span::styled(prefix, Style::default().fg(color)),
        Span::raw(message.to_string()),
    ])
}
