//! Ollama chat client used as the pipeline's generator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use twin_core::config::GenerationParams;
use twin_core::error::GenerationError;
use twin_core::pipeline::Generator;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(
            client,
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string()),
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string()),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

fn chat_request<'a>(
    model: &'a str,
    system_prompt: &'a str,
    user_prompt: &'a str,
    params: GenerationParams,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: system_prompt,
            },
            ChatMessage {
                role: "user",
                content: user_prompt,
            },
        ],
        stream: false,
        options: ChatOptions {
            temperature: params.temperature,
            top_p: params.top_p,
            num_predict: params.max_tokens,
        },
    }
}

impl Generator for OllamaGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: GenerationParams,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&chat_request(&self.model, system_prompt, user_prompt, params))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        Ok(parsed.message.map(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twin_core::config::GENERATION_PARAMS;

    #[test]
    fn request_carries_fixed_options() {
        let body = serde_json::to_value(chat_request("llama3", "sys", "usr", GENERATION_PARAMS)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "usr"}
                ],
                "stream": false,
                "options": {"temperature": 0.0, "top_p": 0.1, "num_predict": 220}
            })
        );
    }

    #[test]
    fn missing_message_reads_as_empty() {
        let parsed: ChatResponse = serde_json::from_value(json!({"done": true})).unwrap();
        assert!(parsed.message.is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let generator = OllamaGenerator::new(reqwest::Client::new(), "http://ollama:11434/", "m");
        assert_eq!(generator.base_url, "http://ollama:11434");
        assert_eq!(generator.model(), "m");
    }
}
