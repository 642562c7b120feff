//! Embedding provider abstraction and implementations.
//!
//! Dispatches on the config's `provider` field:
//! - **`gemini`** — calls the Gemini `batchEmbedContents` API.
//! - **`openai`** — calls the OpenAI `/v1/embeddings` API.
//! - **`hash`** — deterministic offline bag-of-tokens embedding; no network.
//!   Used for tests and air-gapped runs.
//! - **`disabled`** — always errors.
//!
//! Provider calls are a single attempt with the configured timeout. Failures
//! surface as [`StudioError::EmbeddingProvider`] and are never retried here;
//! retrying is the front-end's decision.
//!
//! Also provides the vector utilities used by the store:
//! [`vec_to_blob`] / [`blob_to_vec`] encode embeddings as little-endian f32
//! bytes for SQLite BLOB columns, and [`cosine_similarity`] scores them.

use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Result, StudioError};

/// Dimensionality of the `hash` provider when none is configured.
const HASH_DEFAULT_DIMS: usize = 256;

/// Identifies an embedding space. Persisted with the index so a later open
/// with a different provider/model is detected instead of silently mixing
/// incompatible vectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSignature {
    pub provider: String,
    pub model: String,
    pub dims: usize,
}

impl std::fmt::Display for EmbeddingSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dims)
    }
}

impl EmbeddingSignature {
    /// Resolve the signature the current configuration would produce.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        match config.provider.as_str() {
            "hash" => Ok(Self {
                provider: "hash".to_string(),
                model: "token-hash".to_string(),
                dims: config.dims.unwrap_or(HASH_DEFAULT_DIMS),
            }),
            "gemini" | "openai" => {
                let model = config.model.clone().ok_or_else(|| {
                    StudioError::Configuration("embedding.model is required".to_string())
                })?;
                let dims = config.dims.ok_or_else(|| {
                    StudioError::Configuration("embedding.dims is required".to_string())
                })?;
                Ok(Self {
                    provider: config.provider.clone(),
                    model,
                    dims,
                })
            }
            "disabled" => Err(StudioError::Configuration(
                "embedding provider is disabled".to_string(),
            )),
            other => Err(StudioError::Configuration(format!(
                "unknown embedding provider: {}",
                other
            ))),
        }
    }
}

/// Embed a batch of texts using the configured provider.
///
/// Returns one vector per input text, in input order. `api_key` overrides
/// the provider's environment key when set.
pub async fn embed_texts(
    config: &EmbeddingConfig,
    texts: &[String],
    api_key: Option<&str>,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    match config.provider.as_str() {
        "gemini" => embed_gemini(config, texts, api_key).await,
        "openai" => embed_openai(config, texts, api_key).await,
        "hash" => Ok(texts
            .iter()
            .map(|t| hash_embed(t, config.dims.unwrap_or(HASH_DEFAULT_DIMS)))
            .collect()),
        "disabled" => Err(StudioError::Configuration(
            "embedding provider is disabled".to_string(),
        )),
        other => Err(StudioError::Configuration(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Embed a single query text. Convenience wrapper around [`embed_texts`].
pub async fn embed_query(
    config: &EmbeddingConfig,
    text: &str,
    api_key: Option<&str>,
) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()], api_key).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| StudioError::EmbeddingProvider("empty embedding response".to_string()))
}

// ============ Gemini ============

async fn embed_gemini(
    config: &EmbeddingConfig,
    texts: &[String],
    api_key: Option<&str>,
) -> Result<Vec<Vec<f32>>> {
    let api_key = resolve_key(api_key, "GOOGLE_API_KEY")?;
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| StudioError::Configuration("embedding.model is required".to_string()))?;

    let requests: Vec<serde_json::Value> = texts
        .iter()
        .map(|text| {
            serde_json::json!({
                "model": model,
                "content": { "parts": [ { "text": text } ] },
            })
        })
        .collect();

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/{}:batchEmbedContents?key={}",
        model, api_key
    );

    let json = post_json(
        &url,
        &serde_json::json!({ "requests": requests }),
        config.timeout_secs,
        None,
    )
    .await?;

    parse_gemini_embeddings(&json, texts.len())
}

/// Extract the embedding vectors from a Gemini `batchEmbedContents` response.
///
/// A response carrying fewer (or more) embeddings than inputs is an error; a
/// short batch must never be committed as a complete one.
fn parse_gemini_embeddings(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            StudioError::EmbeddingProvider("invalid Gemini response: missing embeddings".to_string())
        })?;

    if embeddings.len() != expected {
        return Err(StudioError::EmbeddingProvider(format!(
            "provider returned {} embeddings for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    embeddings
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(|v| v.as_array())
                .map(|v| values_to_f32(v))
                .ok_or_else(|| {
                    StudioError::EmbeddingProvider(
                        "invalid Gemini response: missing values".to_string(),
                    )
                })
        })
        .collect()
}

// ============ OpenAI ============

async fn embed_openai(
    config: &EmbeddingConfig,
    texts: &[String],
    api_key: Option<&str>,
) -> Result<Vec<Vec<f32>>> {
    let api_key = resolve_key(api_key, "OPENAI_API_KEY")?;
    let model = config
        .model
        .as_deref()
        .ok_or_else(|| StudioError::Configuration("embedding.model is required".to_string()))?;

    let json = post_json(
        "https://api.openai.com/v1/embeddings",
        &serde_json::json!({ "model": model, "input": texts }),
        config.timeout_secs,
        Some(&api_key),
    )
    .await?;

    parse_openai_embeddings(&json, texts.len())
}

/// Extract the embedding vectors from an OpenAI `/v1/embeddings` response,
/// requiring exactly one vector per input.
fn parse_openai_embeddings(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        StudioError::EmbeddingProvider("invalid OpenAI response: missing data array".to_string())
    })?;

    if data.len() != expected {
        return Err(StudioError::EmbeddingProvider(format!(
            "provider returned {} embeddings for {} inputs",
            data.len(),
            expected
        )));
    }

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .map(|v| values_to_f32(v))
                .ok_or_else(|| {
                    StudioError::EmbeddingProvider(
                        "invalid OpenAI response: missing embedding".to_string(),
                    )
                })
        })
        .collect()
}

// ============ Hash (offline) ============

/// Deterministic bag-of-tokens embedding: each lowercased alphanumeric token
/// is hashed into one of `dims` buckets and the resulting count vector is
/// L2-normalized, so cosine similarity reflects token overlap.
pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dims.max(1)];

    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let bucket = u64::from_le_bytes(prefix) % vec.len() as u64;
        vec[bucket as usize] += 1.0;
    }

    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

// ============ Shared helpers ============

async fn post_json(
    url: &str,
    body: &serde_json::Value,
    timeout_secs: u64,
    bearer: Option<&str>,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| StudioError::EmbeddingProvider(e.to_string()))?;

    let mut request = client.post(url).json(body);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request
        .send()
        .await
        .map_err(|e| StudioError::EmbeddingProvider(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(StudioError::EmbeddingProvider(format!(
            "provider returned {}: {}",
            status, body_text
        )));
    }

    response
        .json()
        .await
        .map_err(|e| StudioError::EmbeddingProvider(e.to_string()))
}

fn resolve_key(api_key: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }
    std::env::var(env_var).map_err(|_| {
        StudioError::Configuration(format!("{} environment variable not set", env_var))
    })
}

fn values_to_f32(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let a = hash_embed("S3 bucket public access", 256);
        let b = hash_embed("S3 bucket public access", 256);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embed_is_normalized() {
        let v = hash_embed("encrypt data at rest", 256);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embed_reflects_token_overlap() {
        let query = hash_embed("S3 bucket public access", 256);
        let s3_doc = hash_embed("Ensure S3 buckets block all public access", 256);
        let ec2_doc = hash_embed("Ensure EC2 instances do not use IMDSv1", 256);

        let s3_score = cosine_similarity(&query, &s3_doc);
        let ec2_score = cosine_similarity(&query, &ec2_doc);
        assert!(
            s3_score > ec2_score,
            "expected S3 doc to outrank EC2: {} vs {}",
            s3_score,
            ec2_score
        );
    }

    #[test]
    fn test_hash_embed_case_insensitive() {
        let a = hash_embed("Encrypted Volumes", 128);
        let b = hash_embed("encrypted volumes", 128);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gemini_parse_rejects_short_response() {
        let json = serde_json::json!({
            "embeddings": [ { "values": [0.1, 0.2] } ]
        });
        let err = parse_gemini_embeddings(&json, 2).unwrap_err();
        assert!(matches!(err, StudioError::EmbeddingProvider(_)));
        assert!(err.to_string().contains("1 embeddings for 2 inputs"));
    }

    #[test]
    fn test_gemini_parse_full_response() {
        let json = serde_json::json!({
            "embeddings": [
                { "values": [0.1, 0.2] },
                { "values": [0.3, 0.4] }
            ]
        });
        let vectors = parse_gemini_embeddings(&json, 2).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], vec![0.3, 0.4]);
    }

    #[test]
    fn test_openai_parse_rejects_short_response() {
        let json = serde_json::json!({
            "data": [ { "embedding": [0.5, 0.5] } ]
        });
        let err = parse_openai_embeddings(&json, 3).unwrap_err();
        assert!(matches!(err, StudioError::EmbeddingProvider(_)));
        assert!(err.to_string().contains("1 embeddings for 3 inputs"));
    }

    #[test]
    fn test_signature_requires_model_for_remote() {
        let config = EmbeddingConfig {
            provider: "gemini".to_string(),
            ..Default::default()
        };
        assert!(EmbeddingSignature::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let config = EmbeddingConfig::default();
        let err = embed_texts(&config, &["x".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::Configuration(_)));
    }
}
