//! Remote LLM collaborator abstraction and implementations.
//!
//! Defines the [`LlmClient`] trait and two implementations:
//! - **[`DisabledClient`]** — always errors; used when no provider is configured.
//! - **[`GeminiClient`]** — calls the Gemini `generateContent` API with
//!   timeout, bounded retry, and exponential backoff.
//!
//! The pipeline treats the upstream response as opaque text; nothing here
//! interprets model output beyond pulling the text field out of the
//! response JSON.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Seam for the remote generation call, mockable in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the provider's model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Sends `prompt` upstream and returns the generated text verbatim.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Builds the question-answering prompt from document context and question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an AI assistant answering questions about an uploaded document.\n\
         \n\
         Document Content:\n\
         {context}\n\
         \n\
         User Question: {question}\n\
         \n\
         Answer based only on the document content above. Cite passages from \
         the document where relevant. If the question cannot be answered from \
         the document, say so and explain why."
    )
}

// ============ Disabled Client ============

/// A no-op client that always returns errors.
///
/// Used when `llm.provider = "disabled"` in the configuration, and in
/// deployments that only exercise upload/indexing.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

// ============ Gemini Client ============

/// Client for the Gemini `generateContent` endpoint.
///
/// Requires the `GEMINI_API_KEY` environment variable. The request body is
/// `{"contents": [{"parts": [{"text": prompt}]}]}` and the reply text is
/// read from `candidates[0].content.parts[0].text`.
pub struct GeminiClient {
    model: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

impl GeminiClient {
    /// Creates a Gemini client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `llm.model` is unset or `GEMINI_API_KEY` is not
    /// in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Gemini provider"))?;

        if std::env::var("GEMINI_API_KEY").is_err() {
            bail!("GEMINI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client.post(&url).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_gemini_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        warn!(%status, attempt, "Gemini API transient error");
                        last_err =
                            Some(anyhow::anyhow!("Gemini API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    debug!(error = %e, attempt, "Gemini API request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}

/// Pulls the generated text out of a `generateContent` response.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    json.get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.get(0))
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidate text"))
}

/// Creates the appropriate [`LlmClient`] based on configuration.
pub fn create_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClient)),
        "gemini" => Ok(Box::new(GeminiClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
