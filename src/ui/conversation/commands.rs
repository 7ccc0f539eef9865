use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new conversation
    New,
    /// Delete the selected conversation
    Delete,
    /// Drop every conversation in this session
    Clear,
    /// Switch to a different model
    Model,
    /// Enter or replace the API key
    Key,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new chat",
            SlashCommand::Delete => "delete the current chat",
            SlashCommand::Clear => "clear all chats",
            SlashCommand::Model => "switch model (/model <name>, or cycle with no name)",
            SlashCommand::Key => "enter your Groq API key",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can be run while a reply is still streaming.
    pub fn available_during_streaming(self) -> bool {
        match self {
            SlashCommand::Model | SlashCommand::Key | SlashCommand::Help | SlashCommand::Quit => true,
            SlashCommand::New | SlashCommand::Delete | SlashCommand::Clear => false,
        }
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim_start().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head).ok().or_else(|| match head.as_str() {
        "q" | "exit" | "bye" => Some(SlashCommand::Quit),
        "n" => Some(SlashCommand::New),
        "models" | "m" => Some(SlashCommand::Model),
        "h" | "?" => Some(SlashCommand::Help),
        "clear-all" => Some(SlashCommand::Clear),
        "rm" => Some(SlashCommand::Delete),
        _ => None,
    })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Commands: ");
    let commands: Vec<String> = SlashCommand::iter()
        .map(|c| format!("/{} ({})", c.command(), c.description()))
        .collect();
    help.push_str(&commands.join(", "));
    help.push_str(". Keys: Tab sidebar, Ctrl+N new, Ctrl+K key, Ctrl+P model, Ctrl+C quit.");
    help
}
