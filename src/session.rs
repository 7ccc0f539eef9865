use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Label used for a conversation that has no user message yet
pub const PLACEHOLDER_NAME: &str = "New Chat";

/// Longest name prefix, in characters, before truncation kicks in
pub const NAME_MAX_CHARS: usize = 30;

const ELLIPSIS: &str = "...";

/// Errors raised by conversation bookkeeping
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no conversation is selected")]
    NoSelection,

    #[error("conversation {0} does not exist")]
    UnknownConversation(ConversationId),

    #[error("system messages can only open a conversation")]
    SystemMessage,
}

/// Role of a message author, serialized the way chat-completion APIs expect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip, default = "Local::now")]
    pub sent_at: DateTime<Local>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sent_at: Local::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Opaque identifier of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered list of messages that always opens with the system instruction
#[derive(Debug, Clone)]
pub struct Conversation {
    id: ConversationId,
    messages: Vec<Message>,
}

impl Conversation {
    fn new(system_prompt: &str) -> Self {
        Self {
            id: ConversationId::new(),
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Full history, system message included
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages shown to the user; the leading system message is hidden
    pub fn transcript(&self) -> &[Message] {
        &self.messages[1..]
    }

    pub fn name(&self) -> String {
        chat_name(&self.messages)
    }
}

/// Derive a sidebar label from the first user message.
///
/// Truncation counts characters, so multi-byte text is never split mid-codepoint.
pub fn chat_name(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == Role::User) else {
        return PLACEHOLDER_NAME.to_string();
    };

    let mut chars = first.content.char_indices();
    match chars.nth(NAME_MAX_CHARS) {
        Some((cut, _)) => format!("{}{}", &first.content[..cut], ELLIPSIS),
        None => first.content.clone(),
    }
}

/// In-memory conversations for one UI session plus the current selection.
///
/// Conversations are kept in creation order. Nothing here is ever written to disk.
#[derive(Debug, Clone)]
pub struct ChatSession {
    system_prompt: String,
    conversations: Vec<Conversation>,
    selected: Option<ConversationId>,
}

impl ChatSession {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            conversations: Vec::new(),
            selected: None,
        }
    }

    /// Start a new conversation and select it
    pub fn create(&mut self) -> ConversationId {
        let conversation = Conversation::new(&self.system_prompt);
        let id = conversation.id();
        self.conversations.push(conversation);
        self.selected = Some(id);
        debug!(conversation = %id, "created conversation");
        id
    }

    /// Create a first conversation when the store is empty and nothing is selected
    pub fn ensure_conversation(&mut self) -> Option<ConversationId> {
        if self.conversations.is_empty() && self.selected.is_none() {
            Some(self.create())
        } else {
            None
        }
    }

    pub fn select(&mut self, id: ConversationId) -> Result<(), SessionError> {
        if !self.contains(id) {
            return Err(SessionError::UnknownConversation(id));
        }
        self.selected = Some(id);
        debug!(conversation = %id, "selected conversation");
        Ok(())
    }

    /// Remove a conversation; dropping the selected one clears the selection
    pub fn delete(&mut self, id: ConversationId) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id() != id);
        let removed = self.conversations.len() != before;

        if self.selected == Some(id) {
            self.selected = None;
        }
        if removed {
            debug!(conversation = %id, "deleted conversation");
        }
        removed
    }

    pub fn clear_all(&mut self) {
        let count = self.conversations.len();
        self.conversations.clear();
        self.selected = None;
        debug!(count, "cleared all conversations");
    }

    /// Append to the selected conversation
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Result<(), SessionError> {
        if role == Role::System {
            return Err(SessionError::SystemMessage);
        }
        let conversation = self.selected_mut().ok_or(SessionError::NoSelection)?;
        conversation.messages.push(Message::new(role, content));
        Ok(())
    }

    pub fn selected_id(&self) -> Option<ConversationId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Conversation> {
        let id = self.selected?;
        self.get(id)
    }

    fn selected_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.selected?;
        self.conversations.iter_mut().find(|c| c.id() == id)
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.get(id).is_some()
    }

    /// Wire history of the selected conversation
    pub fn history(&self) -> Result<Vec<Message>, SessionError> {
        self.selected()
            .map(|c| c.messages().to_vec())
            .ok_or(SessionError::NoSelection)
    }

    /// Sidebar order: most recently created first
    pub fn conversations_newest_first(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "You are a helpful assistant.";

    fn assert_selection_valid(session: &ChatSession) {
        if let Some(id) = session.selected_id() {
            assert!(session.contains(id), "selection {id} points at a missing conversation");
        }
    }

    #[test]
    fn create_selects_and_seeds_system_message() {
        let mut session = ChatSession::new(PROMPT);
        let id = session.create();

        assert_eq!(session.selected_id(), Some(id));
        let conversation = session.selected().unwrap();
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[0].content, PROMPT);
        assert!(conversation.transcript().is_empty());
    }

    #[test]
    fn selection_stays_valid_across_mixed_operations() {
        let mut session = ChatSession::new(PROMPT);
        let a = session.create();
        let b = session.create();
        let c = session.create();
        assert_selection_valid(&session);

        session.select(a).unwrap();
        assert_selection_valid(&session);
        session.delete(b);
        assert_eq!(session.selected_id(), Some(a));
        assert_selection_valid(&session);

        assert!(session.select(b).is_err());
        assert_eq!(session.selected_id(), Some(a));

        session.delete(a);
        assert_eq!(session.selected_id(), None);
        session.select(c).unwrap();
        session.delete(c);
        assert_eq!(session.selected_id(), None);
        assert!(session.is_empty());
    }

    #[test]
    fn deleting_selected_conversation_resets_selection() {
        let mut session = ChatSession::new(PROMPT);
        let keep = session.create();
        let doomed = session.create();

        assert!(session.delete(doomed));
        assert_eq!(session.selected_id(), None);
        assert!(session.contains(keep));
        assert!(!session.delete(doomed));
    }

    #[test]
    fn select_rejects_unknown_id() {
        let mut session = ChatSession::new(PROMPT);
        let stranger = ConversationId::new();
        assert_eq!(session.select(stranger), Err(SessionError::UnknownConversation(stranger)));
        assert_eq!(session.selected_id(), None);
    }

    #[test]
    fn clear_all_empties_store_and_selection() {
        let mut session = ChatSession::new(PROMPT);
        session.create();
        session.create();
        session.append_message(Role::User, "hi").unwrap();

        session.clear_all();
        assert!(session.is_empty());
        assert_eq!(session.selected_id(), None);

        // no-op on an already empty store
        session.clear_all();
        assert!(session.is_empty());
    }

    #[test]
    fn append_requires_selection_and_rejects_system_role() {
        let mut session = ChatSession::new(PROMPT);
        assert_eq!(session.append_message(Role::User, "hi"), Err(SessionError::NoSelection));

        session.create();
        assert_eq!(session.append_message(Role::System, "sneaky"), Err(SessionError::SystemMessage));
        session.append_message(Role::User, "hi").unwrap();
        session.append_message(Role::Assistant, "hello").unwrap();

        let transcript = session.selected().unwrap().transcript();
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        let systems = session.selected().unwrap().messages().iter().filter(|m| m.role == Role::System).count();
        assert_eq!(systems, 1);
    }

    #[test]
    fn ensure_conversation_only_fires_on_empty_store() {
        let mut session = ChatSession::new(PROMPT);
        let first = session.ensure_conversation();
        assert!(first.is_some());
        assert_eq!(session.selected_id(), first);
        assert!(session.ensure_conversation().is_none());

        let id = session.selected_id().unwrap();
        session.create();
        session.delete(id);
        // one chat left, nothing selected: the user picks from the sidebar
        assert!(session.ensure_conversation().is_none());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn sidebar_lists_newest_first() {
        let mut session = ChatSession::new(PROMPT);
        let a = session.create();
        let b = session.create();
        let c = session.create();
        let order: Vec<ConversationId> = session.conversations_newest_first().map(|c| c.id()).collect();
        assert_eq!(order, vec![c, b, a]);
    }

    #[test]
    fn name_uses_first_user_message() {
        let messages = vec![
            Message::system(PROMPT),
            Message::user("Hello"),
            Message::assistant("Hi there"),
            Message::user("Second question"),
        ];
        assert_eq!(chat_name(&messages), "Hello");
    }

    #[test]
    fn name_truncates_long_messages() {
        let long = "abcdefghijklmnopqrstuvwxyz0123456789"[..35].to_string();
        let messages = vec![Message::system(PROMPT), Message::user(long.clone())];
        assert_eq!(chat_name(&messages), format!("{}...", &long[..30]));

        let exact = "x".repeat(30);
        let messages = vec![Message::system(PROMPT), Message::user(exact.clone())];
        assert_eq!(chat_name(&messages), exact);
    }

    #[test]
    fn name_truncation_counts_characters() {
        let text = "é".repeat(31);
        let messages = vec![Message::system(PROMPT), Message::user(text)];
        assert_eq!(chat_name(&messages), format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn name_falls_back_to_placeholder() {
        let mut session = ChatSession::new(PROMPT);
        session.create();
        assert_eq!(session.selected().unwrap().name(), PLACEHOLDER_NAME);
        session.append_message(Role::Assistant, "unprompted").unwrap();
        assert_eq!(session.selected().unwrap().name(), "New Chat");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
