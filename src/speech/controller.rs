//! Speech controller: sole owner of the voice output and the microphone.
//!
//! At most one utterance and one recognition session are alive at any
//! instant. A new utterance cancels the previous one (newest wins);
//! starting to listen while already listening is a no-op.
//!
//! IDLE → LISTENING → IDLE (on result, error or end)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{RecognitionOptions, SpeechRecognizer, SpeechSynthesizer, UtteranceRequest, VoiceOption};

const EVENT_CAPACITY: usize = 64;
const MAX_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    Idle,
    Listening,
}

impl std::fmt::Display for ListeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Listening => write!(f, "LISTENING"),
        }
    }
}

/// Lifecycle notifications for utterances and recognition sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    UtteranceStarted { id: u64 },
    /// Sent exactly once per utterance.
    UtteranceEnded { id: u64, cancelled: bool },
    ListeningStarted,
    ListeningEnded,
}

struct ActiveUtterance {
    id: u64,
    finished: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Voice list and the user's choice, shared with background tasks.
#[derive(Default)]
struct VoiceState {
    voices: Vec<VoiceOption>,
    selected: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct SpeechController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    options: RecognitionOptions,
    voice_state: Arc<Mutex<VoiceState>>,
    utterance: Mutex<Option<ActiveUtterance>>,
    next_id: AtomicU64,
    listening: Arc<AtomicBool>,
    transcripts: mpsc::Sender<String>,
    events: broadcast::Sender<SpeechEvent>,
    voice_watch: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechController {
    /// Recognized transcripts are delivered on `transcripts`.
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        language: &str,
        transcripts: mpsc::Sender<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            synthesizer,
            recognizer,
            options: RecognitionOptions::single_utterance(language),
            voice_state: Arc::new(Mutex::new(VoiceState::default())),
            utterance: Mutex::new(None),
            next_id: AtomicU64::new(0),
            listening: Arc::new(AtomicBool::new(false)),
            transcripts,
            events,
            voice_watch: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events.subscribe()
    }

    // --- Output ---

    /// Speak `text`, cancelling whatever is currently being spoken.
    ///
    /// Returns the utterance id; completion is reported via [`SpeechEvent`].
    pub fn speak(&self, text: &str) -> u64 {
        let mut slot = lock(&self.utterance);
        if let Some(previous) = slot.take() {
            self.cancel_utterance(previous);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let finished = Arc::new(AtomicBool::new(false));
        let spoken = text.replace('\n', ". ");

        let synthesizer = self.synthesizer.clone();
        let voice_state = self.voice_state.clone();
        let events = self.events.clone();
        let done = finished.clone();

        let handle = tokio::spawn(async move {
            let voice = resolve_voice(synthesizer.as_ref(), &voice_state).await;
            let _ = events.send(SpeechEvent::UtteranceStarted { id });
            debug!("Utterance #{id} started (voice: {})", voice.as_deref().unwrap_or("default"));

            let request = UtteranceRequest {
                text: spoken,
                voice,
                volume: MAX_VOLUME,
            };
            if let Err(e) = synthesizer.speak(request).await {
                warn!("Speech synthesis failed: {e}");
            }

            if !done.swap(true, Ordering::AcqRel) {
                let _ = events.send(SpeechEvent::UtteranceEnded { id, cancelled: false });
                debug!("Utterance #{id} finished");
            }
        });

        *slot = Some(ActiveUtterance {
            id,
            finished,
            handle,
        });
        id
    }

    /// Cancel any in-flight utterance. No-op when silent.
    pub fn stop_speaking(&self) {
        if let Some(active) = lock(&self.utterance).take() {
            self.cancel_utterance(active);
        }
    }

    pub fn is_speaking(&self) -> bool {
        lock(&self.utterance)
            .as_ref()
            .is_some_and(|u| !u.finished.load(Ordering::Acquire))
    }

    /// Wait until nothing is being spoken.
    pub async fn wait_until_silent(&self) {
        let mut events = self.events.subscribe();
        while self.is_speaking() {
            if let Err(broadcast::error::RecvError::Closed) = events.recv().await {
                break;
            }
        }
    }

    fn cancel_utterance(&self, active: ActiveUtterance) {
        active.handle.abort();
        if !active.finished.swap(true, Ordering::AcqRel) {
            info!("Utterance #{} cancelled", active.id);
            let _ = self.events.send(SpeechEvent::UtteranceEnded {
                id: active.id,
                cancelled: true,
            });
        }
    }

    // --- Voices ---

    /// Fetch the voice list.
    ///
    /// If the engine has nothing yet, a background task waits for one
    /// change notification, re-reads the list and exits.
    pub async fn load_voices(&self) -> Vec<VoiceOption> {
        match self.synthesizer.voices().await {
            Ok(list) if !list.is_empty() => {
                store_voices(&self.voice_state, list.clone());
                list
            }
            Ok(_) => {
                debug!("Voice list empty, waiting for change notification");
                self.watch_voices();
                Vec::new()
            }
            Err(e) => {
                warn!("Failed to list voices: {e}");
                self.watch_voices();
                Vec::new()
            }
        }
    }

    fn watch_voices(&self) {
        let mut watch = lock(&self.voice_watch);
        if watch.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let synthesizer = self.synthesizer.clone();
        let voice_state = self.voice_state.clone();
        *watch = Some(tokio::spawn(async move {
            synthesizer.voices_changed().await;
            match synthesizer.voices().await {
                Ok(list) => {
                    info!("Voice list updated: {} voice(s)", list.len());
                    store_voices(&voice_state, list);
                }
                Err(e) => warn!("Failed to reload voices: {e}"),
            }
        }));
    }

    /// Cached voice list.
    pub fn voices(&self) -> Vec<VoiceOption> {
        lock(&self.voice_state).voices.clone()
    }

    pub fn selected_voice(&self) -> Option<String> {
        lock(&self.voice_state).selected.clone()
    }

    /// Select a voice by name. Unknown names are kept and fall back to
    /// the engine default at speak time.
    pub fn select_voice(&self, name: &str) {
        info!("Voice selected: {name}");
        lock(&self.voice_state).selected = Some(name.to_string());
    }

    // --- Input ---

    /// Start one recognition session. Returns `false` if one is already running.
    pub fn start_listening(&self) -> bool {
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Already listening, ignoring start");
            return false;
        }

        info!("State: IDLE → LISTENING");
        let _ = self.events.send(SpeechEvent::ListeningStarted);

        let recognizer = self.recognizer.clone();
        let options = self.options.clone();
        let listening = self.listening.clone();
        let events = self.events.clone();
        let transcripts = self.transcripts.clone();

        tokio::spawn(async move {
            let outcome = recognizer.recognize(&options).await;

            listening.store(false, Ordering::Release);
            info!("State: LISTENING → IDLE");
            let _ = events.send(SpeechEvent::ListeningEnded);

            match outcome {
                Ok(Some(transcript)) => {
                    info!("Recognized: \"{transcript}\"");
                    if transcripts.send(transcript).await.is_err() {
                        warn!("Transcript dropped: session closed");
                    }
                }
                Ok(None) => info!("Recognition ended without a result"),
                Err(e) => warn!("Speech recognition error: {e}"),
            }
        });

        true
    }

    pub fn listening_state(&self) -> ListeningState {
        if self.listening.load(Ordering::Acquire) {
            ListeningState::Listening
        } else {
            ListeningState::Idle
        }
    }
}

impl Drop for SpeechController {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.voice_watch).take() {
            handle.abort();
        }
        if let Some(active) = lock(&self.utterance).take() {
            active.handle.abort();
        }
    }
}

/// Store a fresh voice list; the first voice becomes the selection if
/// nothing was chosen yet.
fn store_voices(voice_state: &Mutex<VoiceState>, list: Vec<VoiceOption>) {
    let mut state = lock(voice_state);
    if state.selected.is_none() {
        state.selected = list.first().map(|v| v.name.clone());
    }
    state.voices = list;
}

/// The selected voice if the engine currently offers it, else `None`.
async fn resolve_voice(
    synthesizer: &dyn SpeechSynthesizer,
    voice_state: &Mutex<VoiceState>,
) -> Option<String> {
    let (selected, cached) = {
        let state = lock(voice_state);
        (state.selected.clone()?, state.voices.clone())
    };

    let known = if cached.is_empty() {
        let fresh = synthesizer.voices().await.unwrap_or_default();
        if !fresh.is_empty() {
            lock(voice_state).voices = fresh.clone();
        }
        fresh
    } else {
        cached
    };

    if known.iter().any(|v| v.name == selected) {
        Some(selected)
    } else {
        debug!("Voice '{selected}' not available, using default");
        None
    }
}
