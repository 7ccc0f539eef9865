use crate::session::ConversationId;

/// User intents, produced by key handling and slash commands
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Create a conversation and select it
    NewChat,

    SelectChat(ConversationId),

    DeleteChat(ConversationId),

    ClearAllChats,

    /// Send a user message on the selected conversation
    Submit(String),

    /// Replace the runtime API key; an empty string forgets it
    UpdateApiKey(String),

    /// Pick a model by name, or step to the next one when `None`
    SelectModel(Option<String>),

    ShowHelp,

    ExitRequest,
}

/// Progress of a streamed completion, sent from the request task to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Fragment(String),
    Finished,
    Failed(String),
}
