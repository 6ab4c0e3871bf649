//! Local speech recognition: cpal capture + whisper-rs transcription.
//!
//! One session records from the default input device until the speaker
//! goes quiet (or the duration cap is hit), then transcribes the whole
//! utterance. The GGML model is loaded once and shared.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{RecognitionOptions, SpeechRecognizer};
use crate::config::WhisperConfig;
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct WhisperRecognizer {
    ctx: Arc<WhisperContext>,
    config: WhisperConfig,
}

impl WhisperRecognizer {
    /// Load the Whisper GGML model. Blocking; call from `spawn_blocking`.
    pub fn load(config: &WhisperConfig) -> Result<Self> {
        let model_path = find_model(&config.model)?;
        let model_str = model_path
            .to_str()
            .ok_or_else(|| Error::Config(format!("non UTF-8 model path {}", model_path.display())))?;

        info!("Loading Whisper model from {}", model_path.display());
        let t0 = Instant::now();
        let ctx = WhisperContext::new_with_params(model_str, WhisperContextParameters::default())
            .map_err(|e| Error::Recognition(format!("Failed to load Whisper model: {e}")))?;
        info!("Whisper model loaded in {}ms", t0.elapsed().as_millis());

        Ok(Self {
            ctx: Arc::new(ctx),
            config: config.clone(),
        })
    }

    fn transcribe(&self, samples: &[f32], language: &str) -> Result<String> {
        let t0 = Instant::now();
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| Error::Recognition(format!("Failed to create whisper state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(true);

        state
            .full(params, samples)
            .map_err(|e| Error::Recognition(format!("Whisper inference failed: {e}")))?;

        let mut text = String::new();
        for i in 0..state.full_n_segments() {
            let Some(segment) = state.get_segment(i) else { continue };
            if let Ok(segment_text) = segment.to_str_lossy() {
                let trimmed = segment_text.trim();
                if !trimmed.is_empty() {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(trimmed);
                }
            }
        }

        info!(
            "Transcribed {:.1}s audio in {}ms",
            samples.len() as f64 / f64::from(self.config.sample_rate),
            t0.elapsed().as_millis()
        );
        Ok(text)
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn recognize(&self, options: &RecognitionOptions) -> Result<Option<String>> {
        let config = self.config.clone();
        let samples = tokio::task::spawn_blocking(move || capture_utterance(&config))
            .await
            .map_err(|e| Error::Recognition(format!("capture task failed: {e}")))??;

        if samples.is_empty() || rms_energy(&samples) < self.config.silence_threshold {
            info!("No speech captured");
            return Ok(None);
        }

        // Whisper wants the bare language code: en-US → en
        let language = options
            .language
            .split(['-', '_'])
            .next()
            .unwrap_or("en")
            .to_lowercase();

        let recognizer = self.clone();
        let text = tokio::task::spawn_blocking(move || recognizer.transcribe(&samples, &language))
            .await
            .map_err(|e| Error::Recognition(format!("transcription task failed: {e}")))??;

        Ok(if text.is_empty() { None } else { Some(text) })
    }
}

struct Capture {
    buffer: Vec<f32>,
    heard_speech: bool,
    silence_start: Option<Instant>,
    done: bool,
}

/// Record one utterance from the default input device (mono f32).
fn capture_utterance(config: &WhisperConfig) -> Result<Vec<f32>> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Recognition("No input audio device available".into()))?;
    debug!("Using audio device: {}", device.name().unwrap_or_else(|_| "unknown".into()));

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let max_samples = (config.max_duration * f64::from(config.sample_rate)) as usize;
    let capture = Arc::new(Mutex::new(Capture {
        buffer: Vec::with_capacity(max_samples),
        heard_speech: false,
        silence_start: None,
        done: false,
    }));

    let started = Instant::now();
    let shared = Arc::clone(&capture);
    let threshold = config.silence_threshold;
    let silence_duration = config.silence_duration;
    let min_speech = config.min_speech_duration;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                if inner.done {
                    return;
                }

                let remaining = max_samples.saturating_sub(inner.buffer.len());
                let take = data.len().min(remaining);
                inner.buffer.extend_from_slice(&data[..take]);
                if inner.buffer.len() >= max_samples {
                    inner.done = true;
                    return;
                }

                if started.elapsed().as_secs_f64() < min_speech {
                    return;
                }

                if rms_energy(data) < threshold {
                    let silence_start = *inner.silence_start.get_or_insert_with(Instant::now);
                    if inner.heard_speech && silence_start.elapsed().as_secs_f64() >= silence_duration {
                        debug!("Silence detected for {silence_duration}s, ending capture");
                        inner.done = true;
                    }
                } else {
                    inner.heard_speech = true;
                    inner.silence_start = None;
                }
            },
            move |err| warn!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| Error::Recognition(format!("Failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| Error::Recognition(format!("Failed to start audio stream: {e}")))?;

    let deadline = Duration::from_secs_f64(config.max_duration);
    loop {
        std::thread::sleep(POLL_INTERVAL);
        let done = capture.lock().unwrap_or_else(|e| e.into_inner()).done;
        if done || started.elapsed() >= deadline {
            break;
        }
    }
    drop(stream);

    let samples = std::mem::take(&mut capture.lock().unwrap_or_else(|e| e.into_inner()).buffer);
    info!(
        "Capture stopped: {:.1}s ({} samples)",
        samples.len() as f64 / f64::from(config.sample_rate),
        samples.len()
    );
    Ok(samples)
}

/// RMS energy of audio samples.
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Find the GGML model file by path or by name in the usual directories.
fn find_model(model_name: &str) -> Result<PathBuf> {
    let direct = Path::new(model_name);
    if direct.exists() && direct.extension().is_some() {
        return Ok(direct.to_path_buf());
    }

    let filename = format!("ggml-{}.bin", model_name.replace('/', "-"));
    let search_dirs: Vec<PathBuf> = [
        std::env::current_dir().ok(),
        dirs::home_dir().map(|h| h.join(".cache/whisper")),
        dirs::data_dir().map(|d| d.join("voice-prompt")),
    ]
    .into_iter()
    .flatten()
    .collect();

    search_dirs
        .iter()
        .map(|dir| dir.join(&filename))
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::Config(format!(
                "Whisper model {filename} not found. Download with:\n  \
                 wget https://huggingface.co/ggerganov/whisper.cpp/resolve/main/{filename}\n\
                 Searched in: {search_dirs:?}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms_energy(&[]), 0.0);
        assert_eq!(rms_energy(&[0.0; 64]), 0.0);
        assert!((rms_energy(&[0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_model_is_a_config_error() {
        let err = find_model("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
