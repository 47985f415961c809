//! AI Client — one interface over an OpenAI-compatible HTTP API, or nothing.

use std::time::{Duration, Instant};

use recall_core::RetrievedMemory;
use recall_core::config::AiConfig;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::AiError;
use crate::prompt;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ModerationResult};

/// Pause before retry `n` is `n * RETRY_BACKOFF_MS`.
const RETRY_BACKOFF_MS: u64 = 250;

/// Provider backend, chosen once when the client is built.
#[derive(Debug, Clone)]
pub enum AiProvider {
    /// OpenAI or any API speaking the same `/v1/...` protocol.
    OpenAiCompatible {
        /// Scheme and host, without the `/v1` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No AI available; every call fails with [`AiError::Unavailable`].
    Disabled,
}

/// Routes chat, embedding and moderation calls to the configured provider.
#[derive(Debug, Clone)]
pub struct AiClient {
    provider: AiProvider,
    http: Client,
    model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_ms: u64,
    max_retries: u32,
    system_prompt: String,
}

impl AiClient {
    /// Create a client for `provider` with the remaining settings from
    /// `config`.
    #[must_use]
    pub fn new(provider: AiProvider, config: &AiConfig) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: config.model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_ms: config.request_timeout_ms,
            max_retries: config.max_retries,
            system_prompt: config.system_prompt.clone(),
        }
    }

    /// Build the client described by `config.provider`.
    ///
    /// `"openai"` requires an API key; `"none"` or `"disabled"` yields a
    /// client whose calls all fail with [`AiError::Unavailable`].
    ///
    /// # Errors
    /// [`AiError::ConfigError`] for an unknown provider or a missing key.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let provider = match config.provider.trim().to_lowercase().as_str() {
            "openai" => {
                let api_key = config
                    .api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        AiError::ConfigError(
                            "provider 'openai' needs an API key (set OPENAI_API_KEY)".into(),
                        )
                    })?;
                AiProvider::OpenAiCompatible {
                    base_url: config.base_url.trim_end_matches('/').to_owned(),
                    api_key: api_key.to_owned(),
                }
            }
            "none" | "disabled" => AiProvider::Disabled,
            other => {
                return Err(AiError::ConfigError(format!("unknown AI provider '{other}'")));
            }
        };
        info!(provider = %config.provider, model = %config.model, "AI client configured");
        Ok(Self::new(provider, config))
    }

    /// A client with no backend.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(AiProvider::Disabled, &AiConfig::default())
    }

    /// Check if the client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, AiProvider::Disabled)
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &AiProvider {
        &self.provider
    }

    /// The system prompt every memory-grounded conversation starts with.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Messages for one turn: the configured system prompt with `memories`
    /// as context, then `history`, then `message`.
    #[must_use]
    pub fn build_messages(
        &self,
        memories: &[RetrievedMemory],
        history: &[ChatMessage],
        message: &str,
    ) -> Vec<ChatMessage> {
        prompt::build_messages(&self.system_prompt, &prompt::format_retrieved(memories), history, message)
    }

    /// Answer `message` for `user_id`, grounded in `memories`.
    ///
    /// # Errors
    /// Same as [`generate_response`](Self::generate_response).
    pub async fn respond_with_memories(
        &self,
        user_id: &str,
        memories: &[RetrievedMemory],
        history: &[ChatMessage],
        message: &str,
    ) -> Result<ChatResponse, AiError> {
        let request = ChatRequest::new(self.build_messages(memories, history, message)).for_user(user_id);
        self.generate_response(&request).await
    }

    /// Generate a chat completion.
    ///
    /// # Errors
    /// [`AiError::Unavailable`] without a provider;
    /// [`AiError::Rejected`] when the provider refuses the request;
    /// [`AiError::Timeout`] when every attempt timed out;
    /// [`AiError::RetriesExhausted`] when every attempt failed otherwise;
    /// [`AiError::ParseError`] for a malformed success response.
    pub async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let mut body = json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });
        if let Some(user) = &request.user {
            body["user"] = json!(user);
        }

        let (json, latency_ms) = self.post("chat/completions", &body).await?;
        let (text, tokens_generated) = parse_chat(&json)?;
        debug!(model, tokens_generated, latency_ms, "Generated response");
        Ok(ChatResponse {
            text,
            tokens_generated,
            latency_ms,
            model: json["model"].as_str().unwrap_or(model).to_owned(),
        })
    }

    /// Embed `text` with the configured embedding model.
    ///
    /// # Errors
    /// Same as [`generate_response`](Self::generate_response).
    pub async fn extract_embedding(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let body = json!({ "input": text, "model": self.embedding_model });
        let (json, latency_ms) = self.post("embeddings", &body).await?;
        let embedding = parse_embedding(&json)?;
        debug!(dimensions = embedding.len(), latency_ms, "Generated embedding");
        Ok(embedding)
    }

    /// Run `text` through the provider's moderation endpoint.
    ///
    /// # Errors
    /// Same as [`generate_response`](Self::generate_response).
    pub async fn moderate_content(&self, text: &str) -> Result<ModerationResult, AiError> {
        let body = json!({ "input": text });
        let (json, latency_ms) = self.post("moderations", &body).await?;
        let result = parse_moderation(&json)?;
        if result.flagged {
            warn!(categories = ?result.categories.keys().collect::<Vec<_>>(), "Content flagged");
        }
        debug!(flagged = result.flagged, latency_ms, "Moderated content");
        Ok(result)
    }

    /// POST `body` to `/v1/{endpoint}` with bounded retries.
    async fn post(&self, endpoint: &str, body: &Value) -> Result<(Value, u64), AiError> {
        let (base_url, api_key) = match &self.provider {
            AiProvider::Disabled => {
                return Err(AiError::Unavailable("No AI provider configured".into()));
            }
            AiProvider::OpenAiCompatible { base_url, api_key } => (base_url, api_key),
        };
        let url = format!("{base_url}/v1/{endpoint}");

        let mut failures = Vec::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(endpoint, "Retrying AI call (attempt {}/{})", attempt + 1, self.max_retries + 1);
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt))).await;
            }

            let start = Instant::now();
            match self.attempt(&url, api_key, body).await {
                Ok(json) => {
                    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                    return Ok((json, latency_ms));
                }
                Err(err) if !err.is_retryable() => {
                    warn!(endpoint, "AI call failed permanently: {err}");
                    return Err(err);
                }
                Err(err) => {
                    warn!(endpoint, "AI call failed: {err}");
                    failures.push(err);
                }
            }
        }

        Err(give_up(self.max_retries + 1, self.timeout_ms, &failures))
    }

    /// One HTTP round trip.
    async fn attempt(&self, url: &str, api_key: &str, body: &Value) -> Result<Value, AiError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if status.is_success() {
            return resp.json().await.map_err(|e| self.classify(e));
        }

        let message = resp.text().await.unwrap_or_default();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(AiError::Rejected { status: status.as_u16(), message })
        } else {
            Err(AiError::RequestFailed(format!("HTTP {status}: {message}")))
        }
    }

    fn classify(&self, err: reqwest::Error) -> AiError {
        if err.is_timeout() {
            AiError::Timeout(self.timeout_ms)
        } else {
            err.into()
        }
    }
}

/// Error after the last retry: [`AiError::Timeout`] if every attempt timed
/// out, otherwise [`AiError::RetriesExhausted`] carrying the final failure.
fn give_up(attempts: u32, timeout_ms: u64, failures: &[AiError]) -> AiError {
    if !failures.is_empty() && failures.iter().all(|e| matches!(e, AiError::Timeout(_))) {
        return AiError::Timeout(timeout_ms);
    }
    AiError::RetriesExhausted {
        attempts,
        last_error: failures.last().map(ToString::to_string).unwrap_or_default(),
    }
}

/// Completion text and token count from a chat completion body.
fn parse_chat(json: &Value) -> Result<(String, u32), AiError> {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AiError::ParseError("missing choices[0].message.content".into()))?
        .to_owned();
    let tokens = json["usage"]["completion_tokens"]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    Ok((text, tokens))
}

/// First embedding vector of an embeddings body.
#[allow(clippy::cast_possible_truncation)]
fn parse_embedding(json: &Value) -> Result<Vec<f32>, AiError> {
    let values = json["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| AiError::ParseError("missing data[0].embedding".into()))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| AiError::ParseError(format!("non-numeric embedding value {v}")))
        })
        .collect()
}

/// Flagged categories (with scores) of the first moderation result.
fn parse_moderation(json: &Value) -> Result<ModerationResult, AiError> {
    let result = &json["results"][0];
    let flagged = result["flagged"]
        .as_bool()
        .ok_or_else(|| AiError::ParseError("missing results[0].flagged".into()))?;

    let mut out = ModerationResult { flagged, ..ModerationResult::default() };
    if let Some(categories) = result["categories"].as_object() {
        for (name, hit) in categories {
            if hit.as_bool() == Some(true) {
                let score = result["category_scores"][name.as_str()].as_f64().unwrap_or(0.0);
                out.categories.insert(name.clone(), score);
            }
        }
    }
    Ok(out)
}
