use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use switchboard_core::config::LlmConfig;
use switchboard_core::errors::ProviderError;

use super::{GenerationContext, LlmClient};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Chat-completions client for OpenAI and the OpenAI-compatible endpoints exposed by
/// Gemini and Ollama.
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(ProviderError::NotConfigured(format!(
                "{:?} provider requires an api key",
                config.provider
            )));
        }
        Ok(Self::new(config.effective_base_url(), config.api_key.clone(), config.model.clone()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str, context: Option<&GenerationContext>) -> Value {
        let mut messages = Vec::new();
        if let Some(context) = context {
            if let Some(instructions) = &context.instructions {
                messages.push(json!({ "role": "system", "content": instructions }));
            }
            if let Some(transcript) = &context.transcript {
                messages.push(json!({
                    "role": "system",
                    "content": format!("Conversation so far:\n{transcript}"),
                }));
            }
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&GenerationContext>,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(&self.request_body(prompt, context));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| ProviderError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let payload: Value =
            response.json().await.map_err(|error| ProviderError::Malformed(error.to_string()))?;
        extract_content(&payload)
    }
}

fn extract_content(payload: &Value) -> Result<String, ProviderError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use switchboard_core::config::{AppConfig, LlmProvider};
    use switchboard_core::errors::ProviderError;

    use super::{extract_content, OpenAiCompatibleClient};
    use crate::llm::GenerationContext;

    #[test]
    fn content_is_read_from_first_choice() {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": " billing \n" } }]
        });
        assert_eq!(extract_content(&payload), Ok("billing".to_string()));
    }

    #[test]
    fn missing_content_is_malformed() {
        let error = extract_content(&json!({ "choices": [] })).expect_err("no choices");
        assert!(matches!(error, ProviderError::Malformed(_)));
    }

    #[test]
    fn request_body_carries_instructions_and_transcript() {
        let client = OpenAiCompatibleClient::new(
            "https://example.invalid/v1/",
            Some(SecretString::from("sk-test".to_string())),
            "gemini-2.0-flash",
        );
        let context = GenerationContext::with_instructions("Be brief.").transcript("user: hi");
        let body = client.request_body("classify this", Some(&context));

        let messages = body["messages"].as_array().cloned().unwrap_or_default();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["content"], "Be brief.");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(body["model"], "gemini-2.0-flash");
        assert_eq!(client.base_url, "https://example.invalid/v1");
    }

    #[test]
    fn hosted_provider_without_key_is_not_configured() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::OpenAi;
        config.api_key = None;
        assert!(matches!(
            OpenAiCompatibleClient::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        config.provider = LlmProvider::Ollama;
        let client = OpenAiCompatibleClient::from_config(&config).expect("ollama needs no key");
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }
}
