//! Test doubles shared by unit tests

use crate::llm::{CompletionBackend, CompletionError, CompletionRequest, FragmentStream};
use futures::StreamExt;
use futures::stream;
use std::sync::Mutex;

/// Backend that replays a fixed script once and records the request it saw
pub struct ScriptedBackend {
    script: Mutex<Option<Vec<Result<String, CompletionError>>>>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn fragments(parts: &[&str]) -> Self {
        Self::new(parts.iter().map(|p| Ok(p.to_string())).collect())
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn stream_completion(&self, request: CompletionRequest) -> FragmentStream {
        self.seen.lock().unwrap().push(request);
        let script = self.script.lock().unwrap().take().unwrap_or_default();
        stream::iter(script).boxed()
    }
}
