//! Speech output and input.
//!
//! Components:
//! - `controller`: single-utterance / single-session owner of both engines
//! - `command`: engines backed by external programs (espeak-ng, any STT CLI)
//! - `whisper`: local Whisper recognizer over the default microphone
//!   (feature `whisper`)
//!
//! Engines are consumed through the two traits below and never driven
//! directly by the rest of the crate.

pub mod command;
pub mod controller;
#[cfg(feature = "whisper")]
pub mod whisper;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RecognizerBackend, SpeechConfig};
use crate::{Error, Result};

pub use controller::{ListeningState, SpeechController, SpeechEvent};

/// A voice offered by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOption {
    pub name: String,
    pub lang: String,
}

impl VoiceOption {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

impl std::fmt::Display for VoiceOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.lang)
    }
}

/// Text to speak plus how to speak it.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    pub text: String,
    /// `None` lets the engine pick its default voice.
    pub voice: Option<String>,
    /// 0.0 ..= 1.0
    pub volume: f32,
}

/// Settings for one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl RecognitionOptions {
    /// One utterance, final results only.
    pub fn single_utterance(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            continuous: false,
            interim_results: false,
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voices currently available. May be empty while the engine warms up.
    async fn voices(&self) -> Result<Vec<VoiceOption>>;

    /// Resolves once the voice list may have changed.
    async fn voices_changed(&self) {
        std::future::pending::<()>().await;
    }

    /// Speak until playback finishes. Dropping the future must stop playback.
    async fn speak(&self, request: UtteranceRequest) -> Result<()>;
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen for a single utterance.
    ///
    /// `Ok(None)` means the session ended without a result.
    async fn recognize(&self, options: &RecognitionOptions) -> Result<Option<String>>;
}

/// Synthesizer that speaks nothing. Used when voice output is disabled.
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn voices(&self) -> Result<Vec<VoiceOption>> {
        Ok(Vec::new())
    }

    async fn speak(&self, _request: UtteranceRequest) -> Result<()> {
        Ok(())
    }
}

/// Build the engines selected in the speech config.
pub async fn engines_from_config(
    config: &SpeechConfig,
) -> Result<(Arc<dyn SpeechSynthesizer>, Arc<dyn SpeechRecognizer>)> {
    let synthesizer: Arc<dyn SpeechSynthesizer> = if config.synthesizer.enabled {
        Arc::new(
            command::CommandSynthesizer::new(&config.synthesizer.program)
                .with_args(config.synthesizer.args.clone()),
        )
    } else {
        tracing::info!("Voice output disabled");
        Arc::new(SilentSynthesizer)
    };

    let recognizer: Arc<dyn SpeechRecognizer> = match config.recognizer.backend {
        RecognizerBackend::Command => {
            Arc::new(command::CommandRecognizer::new(config.recognizer.command.clone()))
        }
        #[cfg(feature = "whisper")]
        RecognizerBackend::Whisper => {
            let whisper_config = config.whisper.clone();
            let recognizer =
                tokio::task::spawn_blocking(move || whisper::WhisperRecognizer::load(&whisper_config))
                    .await
                    .map_err(|e| Error::Recognition(format!("model load task failed: {e}")))??;
            Arc::new(recognizer)
        }
        #[cfg(not(feature = "whisper"))]
        RecognizerBackend::Whisper => {
            return Err(Error::Config(
                "recognizer backend 'whisper' needs the `whisper` feature".into(),
            ));
        }
    };

    Ok((synthesizer, recognizer))
}
