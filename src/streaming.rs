use crate::events::TurnEvent;
use crate::llm::{CompletionBackend, CompletionError, CompletionRequest, ModelSettings};
use crate::session::{ChatSession, ConversationId, Role};
use anyhow::Result;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Folds response fragments into the growing reply
#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler {
    text: String,
    fragments: usize,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the accumulated text
    pub fn push(&mut self, fragment: &str) -> &str {
        if !fragment.is_empty() {
            self.text.push_str(fragment);
            self.fragments += 1;
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// Consume a fragment stream to the end, reporting every intermediate value.
///
/// The first error aborts the fold; whatever was accumulated is dropped.
pub async fn assemble<S, F>(fragments: S, mut on_partial: F) -> Result<String, CompletionError>
where
    S: Stream<Item = Result<String, CompletionError>>,
    F: FnMut(&str),
{
    let mut fragments = std::pin::pin!(fragments);
    let mut assembler = ResponseAssembler::new();

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        on_partial(assembler.push(&fragment));
    }

    Ok(assembler.finish())
}

/// Run one assistant turn on the selected conversation.
///
/// The full history goes out with the request; the reply is appended only
/// once the stream has ended cleanly, so a failure leaves the conversation as it was.
pub async fn complete_turn<B, F>(
    session: &mut ChatSession,
    backend: &B,
    settings: &ModelSettings,
    on_partial: F,
) -> Result<String>
where
    B: CompletionBackend + ?Sized,
    F: FnMut(&str),
{
    let history = session.history()?;
    let request = settings.request(history);

    let reply = match assemble(backend.stream_completion(request), on_partial).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "assistant turn abandoned");
            return Err(e.into());
        }
    };

    session.append_message(Role::Assistant, reply.clone())?;
    info!(chars = reply.chars().count(), "assistant turn committed");
    Ok(reply)
}

/// Run the request on a tokio task and report progress over a channel
pub fn spawn_turn(backend: Arc<dyn CompletionBackend>, request: CompletionRequest) -> mpsc::UnboundedReceiver<TurnEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut fragments = backend.stream_completion(request);
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => {
                    if tx.send(TurnEvent::Fragment(text)).is_err() {
                        // receiver gone, nobody is listening any more
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "completion stream failed");
                    let _ = tx.send(TurnEvent::Failed(e.to_string()));
                    return;
                }
            }
        }
        let _ = tx.send(TurnEvent::Finished);
    });

    rx
}

/// What the UI should do after draining a pending turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnProgress {
    Streaming,
    Finished(String),
    Failed(String),
}

/// A turn in flight, owned by the UI between frames
pub struct PendingTurn {
    conversation: ConversationId,
    assembler: ResponseAssembler,
    events: mpsc::UnboundedReceiver<TurnEvent>,
}

impl PendingTurn {
    pub fn new(conversation: ConversationId, events: mpsc::UnboundedReceiver<TurnEvent>) -> Self {
        Self {
            conversation,
            assembler: ResponseAssembler::new(),
            events,
        }
    }

    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }

    /// Partial reply rendered under the transcript
    pub fn partial(&self) -> &str {
        self.assembler.text()
    }

    /// Drain whatever arrived since the last frame without blocking
    pub fn poll(&mut self) -> TurnProgress {
        loop {
            match self.events.try_recv() {
                Ok(TurnEvent::Fragment(text)) => {
                    self.assembler.push(&text);
                }
                Ok(TurnEvent::Finished) => {
                    debug!(fragments = self.assembler.fragments(), "turn finished");
                    return TurnProgress::Finished(std::mem::take(&mut self.assembler).finish());
                }
                Ok(TurnEvent::Failed(error)) => return TurnProgress::Failed(error),
                Err(mpsc::error::TryRecvError::Empty) => return TurnProgress::Streaming,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return TurnProgress::Failed("response stream closed unexpectedly".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use crate::testing::ScriptedBackend;
    use futures::stream;
    use std::time::Duration;

    fn session_with_question(question: &str) -> ChatSession {
        let mut session = ChatSession::new("You are a helpful assistant.");
        session.create();
        session.append_message(Role::User, question).unwrap();
        session
    }

    fn roles_and_contents(messages: &[Message]) -> Vec<(Role, String)> {
        messages.iter().map(|m| (m.role, m.content.clone())).collect()
    }

    #[test]
    fn assembler_accumulates_and_ignores_empty_fragments() {
        let mut assembler = ResponseAssembler::new();
        assert_eq!(assembler.push("Hel"), "Hel");
        assert_eq!(assembler.push(""), "Hel");
        assert_eq!(assembler.push("lo"), "Hello");
        assert_eq!(assembler.fragments(), 2);
        assert_eq!(assembler.finish(), "Hello");
    }

    #[tokio::test]
    async fn assemble_reports_each_partial_in_order() {
        let fragments = stream::iter(["Hel", "lo", " world"].map(|s| Ok(s.to_string())));
        let mut partials = Vec::new();

        let reply = assemble(fragments, |partial| partials.push(partial.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Hello world");
        assert_eq!(partials, vec!["Hel", "Hello", "Hello world"]);
    }

    #[tokio::test]
    async fn assemble_stops_at_first_error() {
        let fragments = stream::iter(vec![
            Ok("Hel".to_string()),
            Err(CompletionError::Malformed("truncated chunk".into())),
            Ok("lo".to_string()),
        ]);
        let mut partials = Vec::new();

        let err = assemble(fragments, |partial| partials.push(partial.to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::Malformed(_)));
        assert_eq!(partials, vec!["Hel"]);
    }

    #[tokio::test]
    async fn complete_turn_sends_history_and_appends_reply() {
        let mut session = session_with_question("Say hello");
        let backend = ScriptedBackend::fragments(&["Hel", "lo", " world"]);
        let settings = ModelSettings::new("llama-3.1-8b-instant");
        let mut partials = Vec::new();

        let reply = complete_turn(&mut session, &backend, &settings, |p| partials.push(p.to_string()))
            .await
            .unwrap();

        assert_eq!(reply, "Hello world");
        assert_eq!(partials, vec!["Hel", "Hello", "Hello world"]);

        let transcript = roles_and_contents(session.selected().unwrap().transcript());
        assert_eq!(
            transcript,
            vec![
                (Role::User, "Say hello".to_string()),
                (Role::Assistant, "Hello world".to_string()),
            ]
        );

        let request = backend.requests().remove(0);
        assert_eq!(request.model, "llama-3.1-8b-instant");
        assert_eq!(request.temperature, 0.6);
        assert_eq!(request.top_p, 1.0);
        assert_eq!(request.max_tokens, 1024);
        assert!(request.stream);
        let sent = roles_and_contents(&request.messages);
        assert_eq!(
            sent,
            vec![
                (Role::System, "You are a helpful assistant.".to_string()),
                (Role::User, "Say hello".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn failed_turn_leaves_conversation_untouched() {
        let mut session = session_with_question("Say hello");
        let before = roles_and_contents(session.selected().unwrap().messages());
        let backend = ScriptedBackend::new(vec![
            Ok("Hel".to_string()),
            Err(CompletionError::Api {
                status: 500,
                message: "upstream exploded".into(),
            }),
        ]);

        let err = complete_turn(&mut session, &backend, &ModelSettings::new("m"), |_| {})
            .await
            .unwrap_err();

        assert!(err.to_string().contains("upstream exploded"));
        assert!(matches!(
            err.downcast_ref::<CompletionError>(),
            Some(CompletionError::Api { status: 500, .. })
        ));
        let after = roles_and_contents(session.selected().unwrap().messages());
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn complete_turn_needs_a_selection() {
        let mut session = ChatSession::new("sys");
        let backend = ScriptedBackend::fragments(&["never"]);
        let err = complete_turn(&mut session, &backend, &ModelSettings::new("m"), |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no conversation is selected"));
        assert!(backend.requests().is_empty());
    }

    async fn poll_until_done(turn: &mut PendingTurn) -> TurnProgress {
        for _ in 0..200 {
            match turn.poll() {
                TurnProgress::Streaming => tokio::time::sleep(Duration::from_millis(5)).await,
                done => return done,
            }
        }
        panic!("turn never finished");
    }

    #[tokio::test]
    async fn pending_turn_collects_spawned_fragments() {
        let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend::fragments(&["Hel", "lo", " world"]));
        let id = ConversationId::new();
        let mut turn = PendingTurn::new(id, spawn_turn(backend, CompletionRequest::new("m", vec![])));

        assert_eq!(turn.conversation(), id);
        assert_eq!(poll_until_done(&mut turn).await, TurnProgress::Finished("Hello world".to_string()));
    }

    #[tokio::test]
    async fn pending_turn_surfaces_failures() {
        let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend::new(vec![
            Ok("partial".to_string()),
            Err(CompletionError::MissingApiKey),
        ]));
        let mut turn = PendingTurn::new(ConversationId::new(), spawn_turn(backend, CompletionRequest::new("m", vec![])));

        match poll_until_done(&mut turn).await {
            TurnProgress::Failed(message) => assert_eq!(message, "no API key provided"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn pending_turn_reports_dropped_sender() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(TurnEvent::Fragment("abc".into())).unwrap();
        drop(tx);
        let mut turn = PendingTurn::new(ConversationId::new(), rx);
        assert!(matches!(turn.poll(), TurnProgress::Failed(_)));
        assert_eq!(turn.partial(), "abc");
    }
}
