//! Language model collaborator: text in, text out.
//!
//! The pipelines only depend on [`LlmClient`]. [`OpenRouterClient`] talks to
//! any OpenAI-compatible `/chat/completions` endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dealscout_shared::{AppConfig, DealScoutError, Result};

/// Sampling knobs for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Temperature 0 with an optional token cap.
    pub fn deterministic(max_tokens: Option<u32>) -> Self {
        Self {
            temperature: Some(0.0),
            max_tokens,
        }
    }
}

/// A single-prompt completion service.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `prompt` to `model` and return the reply text.
    async fn complete(&self, model: &str, prompt: &str, options: CompletionOptions)
    -> Result<String>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterClient
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DealScoutError::Llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from `[llm]` config, reading the key from the configured env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let var = &config.llm.api_key_env;
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DealScoutError::config(format!("{var} is not set")))?;
        Self::new(
            api_key,
            config.llm.base_url.as_str(),
            Duration::from_secs(config.llm.timeout_secs),
        )
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: CompletionOptions,
    ) -> Result<String> {
        let start = Instant::now();
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(model, error = %e, "model request failed");
                DealScoutError::Llm(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model, status = status.as_u16(), "model API error");
            return Err(DealScoutError::Llm(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DealScoutError::Llm(format!("invalid completion body: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DealScoutError::Llm("completion had no content".into()))?;

        debug!(
            model,
            duration_ms = start.elapsed().as_millis() as u64,
            chars = content.len(),
            "model completion"
        );
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Scripted fake for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod scripted {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Replies chosen by the first rule whose needle occurs in the prompt.
    /// Unmatched prompts fail with an `Llm` error.
    #[derive(Default)]
    pub struct ScriptedLlm {
        rules: Vec<(String, std::result::Result<String, String>)>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, needle: &str, text: &str) -> Self {
            self.rules.push((needle.to_string(), Ok(text.to_string())));
            self
        }

        pub fn fail(mut self, needle: &str, message: &str) -> Self {
            self.rules
                .push((needle.to_string(), Err(message.to_string())));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _model: &str,
            prompt: &str,
            _options: CompletionOptions,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.rules.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
                Some((_, Ok(text))) => Ok(text.clone()),
                Some((_, Err(message))) => Err(DealScoutError::Llm(message.clone())),
                None => Err(DealScoutError::Llm("no scripted reply".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpenRouterClient {
        OpenRouterClient::new("sk-test", server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "m1",
                "temperature": 0.0,
                "messages": [{"role": "user", "content": "hello"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .complete("m1", "hello", CompletionOptions::deterministic(None))
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn error_status_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete("m1", "hello", CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DealScoutError::Llm(ref m) if m.contains("slow down")));
    }

    #[tokio::test]
    async fn empty_choices_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let result = client(&server)
            .complete("m1", "hello", CompletionOptions::default())
            .await;
        assert!(result.is_err());
    }
}
