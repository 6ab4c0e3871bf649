//! Gemini text generation client.
//!
//! Posts the prompt to the `generateContent` REST endpoint and joins the
//! text parts of the first candidate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::{Error, Result};

/// Anything that turns a prompt into raw generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct GeminiGenerator {
    model: String,
    api_base: String,
    api_key: Option<String>,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Generation("API key is not configured".into()))?;

        debug!("Sending prompt to Gemini model '{}' ({} chars)", self.model, prompt.len());

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Gemini returned status {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let data: serde_json::Value = resp.json().await?;
        extract_text(&data)
    }
}

/// Join the text parts of the first candidate.
pub fn extract_text(data: &serde_json::Value) -> Result<String> {
    let parts = data["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| {
            let reason = data["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates in response");
            Error::Generation(reason.to_string())
        })?;

    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        return Err(Error::Generation("empty candidate text".into()));
    }
    Ok(text)
}
