/// Instruction placed at the head of every new conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Banner shown above the transcript.
pub const DISCLAIMER: &str = "Disclaimer: This Groq-powered chatbot may occasionally provide incorrect or inconsistent results. \
Please verify any important information and use the responses as a starting point for further conversation.";

pub const MISSING_KEY_WARNING: &str = "Please enter your Groq API key to start chatting (Ctrl+K).";

pub const SELECT_CHAT_HINT: &str = "Select a chat from the sidebar or press Ctrl+N to start a conversation.";

pub const CLEARED_ALL: &str = "All chats have been cleared.";
