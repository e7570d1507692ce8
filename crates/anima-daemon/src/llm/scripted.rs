//! Scripted LLM client: replays queued replies for tests and offline runs.

use std::collections::VecDeque;

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::LlmClient;

pub struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Semaphore>,
}

impl Default for ScriptedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every call waits until [`ScriptedLlm::release`] hands out a permit.
    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.replies.lock().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.replies.lock().push_back(Err(message.into()));
        self
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        self.replies.lock().push_back(Ok(text.into()));
    }

    /// Let `calls` pending completions through.
    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete_text(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }

        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_fails() {
        let llm = ScriptedLlm::new().reply("one").fail("boom");
        assert_eq!(llm.complete_text("m", "a").await.unwrap(), "one");
        assert_eq!(llm.complete_text("m", "b").await.unwrap_err().to_string(), "boom");
        assert!(llm.complete_text("m", "c").await.is_err());
        assert_eq!(llm.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn held_calls_wait_for_release() {
        let llm = Arc::new(ScriptedLlm::held().reply("late"));
        let pending = tokio::spawn({
            let llm = llm.clone();
            async move { llm.complete_text("m", "p").await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!pending.is_finished());
        assert_eq!(llm.call_count(), 1);

        llm.release(1);
        assert_eq!(pending.await.unwrap().unwrap(), "late");
    }
}
