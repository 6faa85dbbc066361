//! Scripted completion service.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use relaygraph_core::{CompletionError, CompletionOptions, CompletionService};

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, CompletionError>>,
    fallback: Option<String>,
    prompts: Vec<String>,
}

/// Completion service answering from a queue of canned replies.
///
/// Replies are consumed in order; once the queue is empty the fallback
/// reply (if any) is returned for every further call. Prompts are recorded
/// so tests can assert on what a node asked for. Clones share the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCompletion {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new().with_fallback(text)
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.lock().replies.push_back(Ok(text.into()));
        self
    }

    pub fn with_error(self, error: CompletionError) -> Self {
        self.lock().replies.push_back(Err(error));
        self
    }

    pub fn with_fallback(self, text: impl Into<String>) -> Self {
        self.lock().fallback = Some(text.into());
        self
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().prompts.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let mut script = self.lock();
        script.prompts.push(prompt.to_string());
        match script.replies.pop_front() {
            Some(reply) => reply,
            None => script.fallback.clone().ok_or_else(|| {
                CompletionError::InvalidResponse("scripted completion has no reply left".to_string())
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
