//! Prompt dispatch: one request to the proxy, one log entry, one utterance.
//!
//! Sends the prompt to the generation endpoint, normalizes the reply and
//! hands it to the conversation log and the speech controller. Every
//! failure degrades to the same fixed message.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::conversation::{ConversationEntry, ConversationLog};
use crate::normalizer;
use crate::speech::SpeechController;
use crate::{Error, Result};

/// Shown and spoken when a prompt could not be answered.
pub const LOAD_FAILED: &str = "Failed to load text";

#[derive(Deserialize)]
struct GenerateBody {
    text: String,
}

#[derive(Clone)]
pub struct PromptDispatcher {
    endpoint: String,
    client: Client,
    log: Arc<ConversationLog>,
    speech: Arc<SpeechController>,
}

impl PromptDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        log: Arc<ConversationLog>,
        speech: Arc<SpeechController>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            log,
            speech,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Resolve `prompt` into exactly one log entry and one utterance.
    ///
    /// Callers reject blank prompts before getting here.
    pub async fn dispatch(&self, prompt: &str) -> ConversationEntry {
        let response = match self.fetch(prompt).await {
            Ok(raw) => normalizer::normalize(&raw),
            Err(e) => {
                warn!("Error fetching text: {e}");
                LOAD_FAILED.to_string()
            }
        };

        let entry = ConversationEntry::new(prompt, response);
        self.log.append(entry.clone());
        self.speech.speak(&entry.response);
        entry
    }

    async fn fetch(&self, prompt: &str) -> Result<String> {
        debug!("GET {} ({} chars)", self.endpoint, prompt.len());

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("prompt", prompt)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Generation(format!("endpoint returned status {status}")));
        }

        let body: GenerateBody = resp.json().await?;
        Ok(body.text)
    }
}
