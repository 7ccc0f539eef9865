use crate::config::Config;
use crate::events::AppEvent;
use crate::llm::{CompletionBackend, CompletionClient, ModelSettings};
use crate::prompts::{CLEARED_ALL, DISCLAIMER, MISSING_KEY_WARNING, SELECT_CHAT_HINT};
use crate::session::{ChatSession, Role};
use crate::streaming::{PendingTurn, TurnProgress, spawn_turn};
use crate::ui::conversation::{
    ComposerResult, ConversationComposer, ConversationHistory, ParsedCommand, Sidebar, SlashCommand,
    StatusMessage, get_help_text, sidebar_entries,
};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Paragraph, Wrap},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BUSY_WARNING: &str = "Wait for the current response to finish.";

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Composer,
    Sidebar,
}

/// Owns the chat session for one run of the UI and routes every user action to it
pub struct ConversationManager {
    config: Config,
    session: ChatSession,
    models: Vec<String>,
    model_index: usize,
    api_key: Option<String>,
    backend: Arc<dyn CompletionBackend>,
    composer: ConversationComposer,
    key_input: Option<ConversationComposer>,
    focus: Focus,
    sidebar_cursor: usize,
    pending: Option<PendingTurn>,
    status: Option<StatusMessage>,
}

impl ConversationManager {
    pub fn new(config: Config, model: Option<String>, api_key: Option<String>) -> Result<Self> {
        let client = CompletionClient::new(&config, api_key.clone())?;
        Ok(Self::with_backend(config, model, api_key, Arc::new(client)))
    }

    pub fn with_backend(
        config: Config,
        model: Option<String>,
        api_key: Option<String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let mut models = config.models.clone();
        let model_index = match model {
            Some(name) => match models.iter().position(|m| *m == name) {
                Some(index) => index,
                None => {
                    models.push(name);
                    models.len() - 1
                }
            },
            None => config.default_model_index(),
        };

        let mut composer = ConversationComposer::new("You", "Type a message, / for commands");
        composer.set_focus(true);

        Self {
            session: ChatSession::new(config.system_prompt.clone()),
            config,
            models,
            model_index,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            backend,
            composer,
            key_input: None,
            focus: Focus::Composer,
            sidebar_cursor: 0,
            pending: None,
            status: None,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn current_model(&self) -> &str {
        &self.models[self.model_index]
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn settings(&self) -> ModelSettings {
        ModelSettings::from_config(&self.config, self.current_model())
    }

    /// Per-frame housekeeping: keep a chat available and drain the stream
    pub fn tick(&mut self) {
        if !self.is_busy() {
            if let Some(id) = self.session.ensure_conversation() {
                debug!(conversation = %id, "opened a first conversation");
            }
        }

        let Some(turn) = self.pending.as_mut() else {
            return;
        };
        let progress = turn.poll();
        let conversation = turn.conversation();

        match progress {
            TurnProgress::Streaming => {}
            TurnProgress::Finished(reply) => {
                self.pending = None;
                if self.session.selected_id() != Some(conversation) {
                    warn!(conversation = %conversation, "reply arrived for a conversation that is no longer selected");
                    self.status = Some(StatusMessage::warning("Reply discarded: its chat is no longer open."));
                    return;
                }
                if let Err(e) = self.session.append_message(Role::Assistant, reply) {
                    self.status = Some(StatusMessage::error(e.to_string()));
                }
            }
            TurnProgress::Failed(error) => {
                self.pending = None;
                self.status = Some(StatusMessage::error(format!("An error occurred: {error}")));
            }
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return self.dispatch(AppEvent::ExitRequest),
            KeyCode::Char('n') if ctrl => return self.dispatch(AppEvent::NewChat),
            KeyCode::Char('k') if ctrl => {
                self.open_key_input();
                return ConversationAction::None;
            }
            KeyCode::Char('p') if ctrl => return self.dispatch(AppEvent::SelectModel(None)),
            KeyCode::F(2) => return self.dispatch(AppEvent::SelectModel(None)),
            _ => {}
        }

        if let Some(input) = self.key_input.as_mut() {
            match input.handle_key(key) {
                ComposerResult::Submitted(key) => {
                    self.close_key_input();
                    return self.dispatch(AppEvent::UpdateApiKey(key));
                }
                ComposerResult::Cancelled => {
                    self.close_key_input();
                    self.status = Some(StatusMessage::info("API key entry cancelled."));
                }
                ComposerResult::Command(_) | ComposerResult::None => {}
            }
            return ConversationAction::None;
        }

        match self.focus {
            Focus::Sidebar => self.handle_sidebar_key(key),
            Focus::Composer => {
                if key.code == KeyCode::Tab && !self.composer.is_palette_open() {
                    self.set_focus(Focus::Sidebar);
                    return ConversationAction::None;
                }
                match self.composer.handle_key(key) {
                    ComposerResult::Submitted(text) => self.dispatch(AppEvent::Submit(text)),
                    ComposerResult::Command(command) => self.run_command(command),
                    ComposerResult::Cancelled | ComposerResult::None => ConversationAction::None,
                }
            }
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        match self.key_input.as_mut() {
            Some(input) => input.paste(text.trim()),
            None if self.focus == Focus::Composer => self.composer.paste(text),
            None => {}
        }
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) -> ConversationAction {
        let entries = sidebar_entries(&self.session);
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.sidebar_cursor = self.sidebar_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.sidebar_cursor + 1 < entries.len() {
                    self.sidebar_cursor += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(entry) = entries.get(self.sidebar_cursor) {
                    let action = self.dispatch(AppEvent::SelectChat(entry.id));
                    self.set_focus(Focus::Composer);
                    return action;
                }
            }
            KeyCode::Char('d') | KeyCode::Delete => {
                if let Some(entry) = entries.get(self.sidebar_cursor) {
                    return self.dispatch(AppEvent::DeleteChat(entry.id));
                }
            }
            KeyCode::Char('n') => {
                let action = self.dispatch(AppEvent::NewChat);
                self.set_focus(Focus::Composer);
                return action;
            }
            KeyCode::Char('c') => return self.dispatch(AppEvent::ClearAllChats),
            KeyCode::Tab | KeyCode::Esc => self.set_focus(Focus::Composer),
            _ => {}
        }
        ConversationAction::None
    }

    fn run_command(&mut self, command: ParsedCommand) -> ConversationAction {
        if self.is_busy() && !command.command.available_during_streaming() {
            self.status = Some(StatusMessage::warning(BUSY_WARNING));
            return ConversationAction::None;
        }

        match command.command {
            SlashCommand::New => self.dispatch(AppEvent::NewChat),
            SlashCommand::Delete => match self.session.selected_id() {
                Some(id) => self.dispatch(AppEvent::DeleteChat(id)),
                None => {
                    self.status = Some(StatusMessage::info("No chat is selected."));
                    ConversationAction::None
                }
            },
            SlashCommand::Clear => self.dispatch(AppEvent::ClearAllChats),
            SlashCommand::Model => self.dispatch(AppEvent::SelectModel(command.argument().map(str::to_string))),
            SlashCommand::Key => {
                self.open_key_input();
                ConversationAction::None
            }
            SlashCommand::Help => self.dispatch(AppEvent::ShowHelp),
            SlashCommand::Quit => self.dispatch(AppEvent::ExitRequest),
        }
    }

    /// Apply one user intent to the session
    pub fn dispatch(&mut self, event: AppEvent) -> ConversationAction {
        let mutates_store = matches!(
            event,
            AppEvent::NewChat
                | AppEvent::SelectChat(_)
                | AppEvent::DeleteChat(_)
                | AppEvent::ClearAllChats
                | AppEvent::Submit(_)
        );
        if mutates_store && self.is_busy() {
            self.status = Some(StatusMessage::warning(BUSY_WARNING));
            return ConversationAction::None;
        }

        match event {
            AppEvent::NewChat => {
                let id = self.session.create();
                info!(conversation = %id, "new chat");
                self.sidebar_cursor = 0;
                self.status = None;
            }
            AppEvent::SelectChat(id) => match self.session.select(id) {
                Ok(()) => self.status = None,
                Err(e) => self.status = Some(StatusMessage::error(e.to_string())),
            },
            AppEvent::DeleteChat(id) => {
                if self.session.delete(id) {
                    info!(conversation = %id, "deleted chat");
                    self.status = Some(StatusMessage::success("Chat deleted."));
                }
                self.sidebar_cursor = self.sidebar_cursor.min(self.session.len().saturating_sub(1));
            }
            AppEvent::ClearAllChats => {
                self.session.clear_all();
                info!("cleared all chats");
                self.sidebar_cursor = 0;
                self.status = Some(StatusMessage::success(CLEARED_ALL));
            }
            AppEvent::Submit(text) => self.submit(text),
            AppEvent::UpdateApiKey(key) => self.update_api_key(key),
            AppEvent::SelectModel(name) => self.select_model(name),
            AppEvent::ShowHelp => self.status = Some(StatusMessage::info(get_help_text())),
            AppEvent::ExitRequest => return ConversationAction::Exit,
        }

        ConversationAction::None
    }

    fn submit(&mut self, text: String) {
        let Some(conversation) = self.session.selected_id() else {
            self.status = Some(StatusMessage::info(SELECT_CHAT_HINT));
            return;
        };

        if let Err(e) = self.session.append_message(Role::User, text) {
            self.status = Some(StatusMessage::error(e.to_string()));
            return;
        }

        if !self.has_api_key() {
            self.status = Some(StatusMessage::warning(MISSING_KEY_WARNING));
            return;
        }

        let history = match self.session.history() {
            Ok(history) => history,
            Err(e) => {
                self.status = Some(StatusMessage::error(e.to_string()));
                return;
            }
        };

        let request = self.settings().request(history);
        let events = spawn_turn(Arc::clone(&self.backend), request);
        self.pending = Some(PendingTurn::new(conversation, events));
        self.status = None;
    }

    fn update_api_key(&mut self, key: String) {
        let key = key.trim().to_string();
        let key = (!key.is_empty()).then_some(key);

        match CompletionClient::new(&self.config, key.clone()) {
            Ok(client) => {
                let message = if key.is_some() {
                    StatusMessage::success("API key set for this session.")
                } else {
                    StatusMessage::info("API key cleared.")
                };
                self.backend = Arc::new(client);
                self.api_key = key;
                self.status = Some(message);
                info!(has_key = self.api_key.is_some(), "api key updated");
            }
            Err(e) => self.status = Some(StatusMessage::error(format!("Could not build HTTP client: {e}"))),
        }
    }

    fn select_model(&mut self, name: Option<String>) {
        match name {
            Some(name) => match self.models.iter().position(|m| *m == name) {
                Some(index) => self.model_index = index,
                None => {
                    self.status = Some(StatusMessage::error(format!("Unknown model: {name}")));
                    return;
                }
            },
            None => self.model_index = (self.model_index + 1) % self.models.len(),
        }
        self.status = Some(StatusMessage::info(format!("Model: {}", self.current_model())));
    }

    fn open_key_input(&mut self) {
        let mut input = ConversationComposer::masked("Enter Groq API Key (Enter to save, Esc to cancel)", "");
        input.set_focus(true);
        self.key_input = Some(input);
        self.composer.set_focus(false);
    }

    fn close_key_input(&mut self) {
        self.key_input = None;
        self.composer.set_focus(self.focus == Focus::Composer);
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.composer.set_focus(focus == Focus::Composer && self.key_input.is_none());
        if focus == Focus::Sidebar {
            let selected = self.session.selected_id();
            self.sidebar_cursor = sidebar_entries(&self.session)
                .iter()
                .position(|entry| Some(entry.id) == selected)
                .unwrap_or(0);
        }
    }

    /// Render the sidebar, transcript, composer and status line
    pub fn render(&self, frame: &mut Frame) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(34), Constraint::Min(30)])
            .split(frame.size());

        let entries = sidebar_entries(&self.session);
        frame.render_widget(
            Sidebar {
                entries: &entries,
                cursor: self.sidebar_cursor,
                has_focus: self.focus == Focus::Sidebar && self.key_input.is_none(),
                model: self.current_model(),
                has_api_key: self.has_api_key(),
            },
            columns[0],
        );

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // disclaimer
                Constraint::Min(5),    // transcript
                Constraint::Length(3), // composer
                Constraint::Length(2), // status
            ])
            .split(columns[1]);

        frame.render_widget(
            Paragraph::new(DISCLAIMER)
                .style(Style::default().fg(Color::Yellow))
                .wrap(Wrap { trim: true }),
            rows[0],
        );

        let partial = self.pending.as_ref().map(PendingTurn::partial);
        let history = match self.session.selected() {
            Some(conversation) => ConversationHistory::new(conversation.transcript(), conversation.name())
                .streaming(partial)
                .empty_hint("Ask anything to get started."),
            None => ConversationHistory::new(&[], "Chatbot").empty_hint(SELECT_CHAT_HINT),
        };
        frame.render_widget(history, rows[1]);

        match &self.key_input {
            Some(input) => frame.render_widget(input, rows[2]),
            None => frame.render_widget(&self.composer, rows[2]),
        }

        if let Some(status) = &self.status {
            frame.render_widget(Paragraph::new(status.to_line()).wrap(Wrap { trim: true }), rows[3]);
        } else if self.is_busy() {
            frame.render_widget(
                Paragraph::new(format!("{} is responding...", self.current_model()))
                    .style(Style::default().fg(Color::DarkGray)),
                rows[3],
            );
        }
    }
}
