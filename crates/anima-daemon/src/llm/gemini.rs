use anyhow::{Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json};

use super::LlmClient;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    async fn complete_text(&self, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }]
        });

        let resp = self
            .http
            .post(self.url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "no body".to_string());
            tracing::error!(%status, %body, "Gemini request failed");
            return Err(anyhow!("Gemini error {}: {}", status, body));
        }

        let json: Value = resp.json().await?;
        extract_text(&json)
    }
}

fn extract_text(resp: &Value) -> Result<String> {
    resp.pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid Gemini response"))
}
