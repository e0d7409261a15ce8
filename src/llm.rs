//! Language-model backends for the [`GenerationBackend`] trait.
//!
//! | `generation.provider` | Backend | Default endpoint |
//! |-----------------------|---------|------------------|
//! | `"groq"` | [`OpenAICompatBackend`] | Groq `/openai/v1/chat/completions`, `llama-3.1-8b-instant` |
//! | `"openai"` | [`OpenAICompatBackend`] | OpenAI `/v1/chat/completions`, `gpt-4o-mini` |
//! | `"huggingface"` | [`HuggingFaceBackend`] | Inference API, `meta-llama/Llama-3-8b-chat-hf` |
//! | `"disabled"` | [`DisabledBackend`] | none |
//!
//! API keys are read from the environment when the backend is built. A
//! missing key is not fatal at startup; each call then fails with a
//! [`RagError::GenerationBackend`] naming the variable to set, and the
//! answer generator turns that into a user-facing message.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use ragchat_core::generate::GenerationBackend;
use ragchat_core::{RagError, Result};

use crate::config::GenerationConfig;

/// System message sent with every chat-completions request.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on \
the provided context. If the context doesn't contain enough information, say so.";

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const HF_BASE_URL: &str = "https://api-inference.huggingface.co/models";
const HF_DEFAULT_MODEL: &str = "meta-llama/Llama-3-8b-chat-hf";
const HF_MAX_NEW_TOKENS: u32 = 512;

fn backend_err(msg: impl Into<String>) -> RagError {
    RagError::GenerationBackend(msg.into())
}

/// Turn a non-success HTTP reply into an actionable message.
fn classify_status(label: &str, status: reqwest::StatusCode, body: &str, key_var: &str, model: &str) -> RagError {
    match status.as_u16() {
        401 | 403 => backend_err(format!(
            "Invalid API key. Please check {} in your environment.",
            key_var
        )),
        404 => backend_err(format!(
            "{} API endpoint or model '{}' not found. Please check the model name and URL.",
            label, model
        )),
        429 => backend_err(format!("{} rate limit or quota exceeded: {}", label, body)),
        _ => backend_err(format!("{} API error {}: {}", label, status, body)),
    }
}

fn read_api_key(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            warn!(var, "API key not set; generation requests will fail until it is");
            None
        }
    }
}

// ============ OpenAI-compatible chat completions ============

/// Any `/v1/chat/completions` server: Groq, OpenAI, vLLM, LM Studio.
pub struct OpenAICompatBackend {
    label: String,
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    key_var: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAICompatBackend {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let (default_url, default_model) = match config.provider.as_str() {
            "groq" => (GROQ_URL, "llama-3.1-8b-instant"),
            _ => (OPENAI_URL, "gpt-4o-mini"),
        };
        let key_var = config.api_key_var().to_string();

        Ok(Self {
            label: config.provider.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.unwrap_or(30)))
                .build()?,
            url: config.url.clone().unwrap_or_else(|| default_url.to_string()),
            api_key: read_api_key(&key_var),
            key_var,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAICompatBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| backend_err(format!("{} not set", self.key_var)))?;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| backend_err(format!("{} request failed: {}", self.label, e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(classify_status(&self.label, status, &text, &self.key_var, &self.model));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| backend_err(format!("{} returned invalid JSON: {}", self.label, e)))?;
        parse_chat_completion(&payload)
    }
}

fn parse_chat_completion(payload: &Value) -> Result<String> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| backend_err("response has no choices[0].message.content"))
}

// ============ Hugging Face Inference API ============

pub struct HuggingFaceBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    key_var: String,
    model: String,
    temperature: f32,
}

impl HuggingFaceBackend {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| HF_DEFAULT_MODEL.to_string());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", HF_BASE_URL, model));
        let key_var = config.api_key_var().to_string();

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.unwrap_or(60)))
                .build()?,
            url,
            api_key: read_api_key(&key_var),
            key_var,
            model,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl GenerationBackend for HuggingFaceBackend {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| backend_err(format!("{} not set", self.key_var)))?;

        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": HF_MAX_NEW_TOKENS,
                "temperature": self.temperature,
                "return_full_text": false
            }
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| backend_err(format!("huggingface request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(classify_status("huggingface", status, &text, &self.key_var, &self.model));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| backend_err(format!("huggingface returned invalid JSON: {}", e)))?;
        Ok(parse_hf_response(&payload))
    }
}

/// Accept `[{generated_text}]`, `[{summary_text}]`, or a bare object;
/// anything else is returned as raw JSON text.
fn parse_hf_response(payload: &Value) -> String {
    let first = match payload {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(payload),
        _ => None,
    };
    first
        .and_then(|item| {
            item.get("generated_text")
                .or_else(|| item.get("summary_text"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

// ============ Disabled ============

/// Used when no provider is configured; every call fails with a hint.
pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(backend_err(
            "no language model is configured. Set [generation] provider = \"groq\" \
             and GROQ_API_KEY (or use openai / huggingface)",
        ))
    }
}

/// Create the [`GenerationBackend`] named by `generation.provider`.
pub fn create_backend(config: &GenerationConfig) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "groq" | "openai" => Ok(Arc::new(OpenAICompatBackend::new(config)?)),
        "huggingface" => Ok(Arc::new(HuggingFaceBackend::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
