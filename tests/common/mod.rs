//! Shared stubs for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use voice_prompt::generation::TextGenerator;
use voice_prompt::server::{self, ProxyState};
use voice_prompt::speech::{
    RecognitionOptions, SpeechEvent, SpeechRecognizer, SpeechSynthesizer, UtteranceRequest,
    VoiceOption,
};
use voice_prompt::{Error, Result};

/// Generator that records prompts and answers from a script
#[derive(Default)]
pub struct StubGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub reply: Option<String>,
}

impl StubGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| Error::Generation("quota exceeded for key sk-secret".into()))
    }
}

pub fn proxy_state(generator: Arc<StubGenerator>) -> ProxyState {
    ProxyState {
        generator,
        default_prompt: voice_prompt::config::DEFAULT_PROMPT.to_string(),
    }
}

/// Serve the proxy on an ephemeral port
pub async fn spawn_proxy(generator: Arc<StubGenerator>, route: &str) -> SocketAddr {
    let app = server::router(proxy_state(generator), route);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct RecordingSynth {
    pub spoken: Mutex<Vec<UtteranceRequest>>,
}

impl RecordingSynth {
    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn voices(&self) -> Result<Vec<VoiceOption>> {
        Ok(vec![VoiceOption::new("test-voice", "en-US")])
    }

    async fn speak(&self, request: UtteranceRequest) -> Result<()> {
        self.spoken.lock().unwrap().push(request);
        Ok(())
    }
}

/// Recognizer that returns a fixed transcript once
pub struct FixedRecognizer(pub Option<String>);

#[async_trait]
impl SpeechRecognizer for FixedRecognizer {
    async fn recognize(&self, _options: &RecognitionOptions) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Wait until `count` utterances have ended
pub async fn wait_for_utterances(events: &mut broadcast::Receiver<SpeechEvent>, count: usize) {
    let mut ended = 0;
    while ended < count {
        if let SpeechEvent::UtteranceEnded { .. } = events.recv().await.unwrap() {
            ended += 1;
        }
    }
}
