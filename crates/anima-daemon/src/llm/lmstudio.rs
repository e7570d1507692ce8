use anyhow::{Result, anyhow};
use reqwest::Client;
use serde_json::{Value, json};

use super::LlmClient;

/// OpenAI-compatible chat completions served by LM Studio.
pub struct LmStudioClient {
    http: Client,
    endpoint: String,
}

impl LmStudioClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.endpoint.trim_end_matches('/')
        )
    }

    async fn send(&self, payload: Value) -> Result<Value> {
        let resp = self.http.post(self.url()).json(&payload).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "no body".to_string());
            tracing::error!(%status, %body, "LM Studio request failed");
            return Err(anyhow!("LM Studio error {}: {}", status, body));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl LlmClient for LmStudioClient {
    async fn complete_text(&self, model: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "stream": false
        });
        let resp = self.send(body).await?;
        extract_text(&resp)
    }
}

fn extract_text(resp: &Value) -> Result<String> {
    let message = resp
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("message missing"))?;

    match message.get("content") {
        Some(Value::String(text)) if !text.is_empty() => Ok(text.clone()),
        Some(Value::Array(items)) => {
            let combined: String = items
                .iter()
                .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect();
            if combined.is_empty() {
                Err(anyhow!("empty content in LM Studio response"))
            } else {
                Ok(combined)
            }
        }
        _ => Err(anyhow!("Unable to extract text from LM Studio response")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_and_part_content() {
        let plain = json!({"choices": [{"message": {"content": "merhaba"}}]});
        assert_eq!(extract_text(&plain).unwrap(), "merhaba");

        let parts = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "mer"},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "haba"}
        ]}}]});
        assert_eq!(extract_text(&parts).unwrap(), "merhaba");
    }

    #[test]
    fn rejects_missing_or_empty_content() {
        assert!(extract_text(&json!({"choices": []})).is_err());
        assert!(extract_text(&json!({"choices": [{"message": {"content": ""}}]})).is_err());
        assert!(extract_text(&json!({"choices": [{"message": {"content": null}}]})).is_err());
    }

    #[test]
    fn url_tolerates_trailing_slash() {
        let client = LmStudioClient::new("http://127.0.0.1:1234/");
        assert_eq!(client.url(), "http://127.0.0.1:1234/v1/chat/completions");
    }
}
