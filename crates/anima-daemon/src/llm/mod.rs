mod gemini;
mod lmstudio;
mod scripted;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use lmstudio::LmStudioClient;
pub use scripted::ScriptedLlm;

use crate::config::{LlmConfig, LlmProvider};

pub type SharedLlm = Arc<dyn LlmClient>;

/// External text generator. The brain only ever sends a single prompt and
/// reads back plain text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_text(&self, model: &str, prompt: &str) -> Result<String>;
}

pub fn create_client(config: &LlmConfig) -> Result<SharedLlm> {
    match &config.provider {
        LlmProvider::LmStudio { endpoint } => Ok(Arc::new(LmStudioClient::new(endpoint))),
        LlmProvider::Gemini {
            api_key_env,
            endpoint,
        } => {
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("Gemini requires ${api_key_env} to be set"))?;
            Ok(Arc::new(GeminiClient::new(api_key, endpoint.clone())))
        }
    }
}

/// Remove markdown code fences some models wrap JSON answers in.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}
