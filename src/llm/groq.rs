//! Groq chat-completion backend (OpenAI-compatible wire shape).

use super::{ChatApi, ChatError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const CHAT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct GroqChat {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GroqChat {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatApi for GroqChat {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, ChatError> {
        let req = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
        };

        let resp = self
            .http
            .post(GROQ_URL)
            .timeout(CHAT_TIMEOUT)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| ChatError::Upstream(format!("groq request: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ChatError::RateLimited);
        }

        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = body.chars().take(400).collect();
            return Err(ChatError::Upstream(format!(
                "groq {}: {snippet}",
                status.as_u16()
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Upstream(format!("groq json parse: {e}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: String,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: String,
}
