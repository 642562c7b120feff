//! LLM completion model abstraction.
//!
//! Defines the [`CompletionModel`] seam the workflows generate through, with
//! Gemini and OpenAI implementations. Each call is a single request with the
//! configured timeout; failures surface to the caller unretried.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::error::StudioError;

/// Model references accepted per provider. An unknown reference is rejected
/// at construction so a typo fails before any workflow step runs.
const SUPPORTED_GEMINI_MODELS: &[&str] = &[
    "models/gemini-1.5-flash",
    "models/gemini-1.5-pro",
    "models/gemini-2.0-flash",
];

const SUPPORTED_OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini"];

/// A text completion model. Workflows depend on this trait so generation can
/// be tested against a scripted implementation.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Model reference (e.g. `"models/gemini-1.5-flash"`).
    fn reference(&self) -> &str;

    /// Send one prompt, return the model's text response.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Instantiate the completion model for a provider/reference pair.
///
/// The API key comes from `api_key` or the provider's environment variable
/// (`GOOGLE_API_KEY` / `OPENAI_API_KEY`); a missing key is a configuration
/// error here, not a runtime failure mid-workflow.
pub fn create_model(
    provider: &str,
    reference: &str,
    api_key: Option<String>,
    timeout_secs: u64,
) -> std::result::Result<Box<dyn CompletionModel>, StudioError> {
    match provider {
        "gemini" => {
            require_supported(reference, SUPPORTED_GEMINI_MODELS, "gemini")?;
            let key = resolve_key(api_key, "GOOGLE_API_KEY")?;
            Ok(Box::new(GeminiModel {
                reference: reference.to_string(),
                api_key: key,
                timeout_secs,
            }))
        }
        "openai" => {
            require_supported(reference, SUPPORTED_OPENAI_MODELS, "openai")?;
            let key = resolve_key(api_key, "OPENAI_API_KEY")?;
            Ok(Box::new(OpenAiModel {
                reference: reference.to_string(),
                api_key: key,
                timeout_secs,
            }))
        }
        other => Err(StudioError::Configuration(format!(
            "unsupported LLM provider: {}",
            other
        ))),
    }
}

fn require_supported(
    reference: &str,
    supported: &[&str],
    provider: &str,
) -> std::result::Result<(), StudioError> {
    if supported.contains(&reference) {
        Ok(())
    } else {
        Err(StudioError::Configuration(format!(
            "model '{}' is not supported by {}; supported models: {}",
            reference,
            provider,
            supported.join(", ")
        )))
    }
}

fn resolve_key(
    api_key: Option<String>,
    env_var: &str,
) -> std::result::Result<String, StudioError> {
    match api_key {
        Some(key) if !key.is_empty() => Ok(key),
        _ => std::env::var(env_var).map_err(|_| {
            StudioError::Configuration(format!("{} environment variable not set", env_var))
        }),
    }
}

// ============ Gemini ============

/// Completion model calling the Gemini `generateContent` endpoint.
pub struct GeminiModel {
    reference: String,
    api_key: String,
    timeout_secs: u64,
}

#[async_trait]
impl CompletionModel for GeminiModel {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{}:generateContent?key={}",
            self.reference, self.api_key
        );

        let body = serde_json::json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ],
        });

        let json = post_json(&url, &body, self.timeout_secs, None).await?;

        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .context("invalid Gemini response: missing candidate text")
    }
}

// ============ OpenAI ============

/// Completion model calling the OpenAI chat completions endpoint.
pub struct OpenAiModel {
    reference: String,
    api_key: String,
    timeout_secs: u64,
}

#[async_trait]
impl CompletionModel for OpenAiModel {
    fn reference(&self) -> &str {
        &self.reference
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.reference,
            "messages": [ { "role": "user", "content": prompt } ],
        });

        let json = post_json(
            "https://api.openai.com/v1/chat/completions",
            &body,
            self.timeout_secs,
            Some(&self.api_key),
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .context("invalid OpenAI response: missing message content")
    }
}

async fn post_json(
    url: &str,
    body: &serde_json::Value,
    timeout_secs: u64,
    bearer: Option<&str>,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("LLM API error {}: {}", status, body_text);
    }

    Ok(response.json().await?)
}
