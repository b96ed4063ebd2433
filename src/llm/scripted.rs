use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ConductorError;
use super::provider::LLMProvider;
use super::types::{GenerationOptions, LLMResponse};

/// Offline provider that replays queued replies in order.
///
/// Once the queue is drained it answers with a deterministic echo of the
/// prompt's first line, unless it was built with [`ScriptedProvider::unavailable`].
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ConductorError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
    unavailable: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            unavailable: false,
        }
    }

    /// A provider whose every call fails with a connection error.
    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::new() }
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    pub fn with_error(self, error: ConductorError) -> Self {
        self.replies.lock().push_back(Err(error));
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: ConductorError) {
        self.replies.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(
        &self,
        prompt: &str,
        _system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LLMResponse, ConductorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        if self.unavailable {
            return Err(ConductorError::Network("scripted provider unavailable".into()));
        }

        let next = self.replies.lock().pop_front();
        let content = match next {
            Some(reply) => reply?,
            None => format!("(scripted) {}", prompt.lines().next().unwrap_or_default()),
        };

        Ok(LLMResponse {
            content,
            input_tokens: None,
            output_tokens: None,
            model: options.model.clone().unwrap_or_else(|| "scripted".to_string()),
        })
    }

    fn provider_name(&self) -> &str { "scripted" }
    fn model_name(&self) -> &str { "scripted" }
}
