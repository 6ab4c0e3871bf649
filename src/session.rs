//! Interactive chat session.
//!
//! Owns the session state (conversation log, speech controller,
//! dispatcher) and multiplexes typed lines, recognized transcripts and
//! freshly appended entries.
//!
//! When input closes, prompts still in flight are answered and spoken
//! before `run` returns. `/quit` drops them.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::conversation::{render_entry, ConversationLog};
use crate::dispatch::PromptDispatcher;
use crate::speech::SpeechController;

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Listen,
    Stop,
    Voices,
    Voice(String),
    History,
    Help,
    Quit,
}

impl Command {
    /// Lines that are not a known `/command` are prompts, kept verbatim.
    /// A leading `//` sends the rest of the line starting with `/`.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if let Some(escaped) = trimmed.strip_prefix("//") {
            return Self::Prompt(format!("/{escaped}"));
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Prompt(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        match name {
            "listen" | "speak" => Self::Listen,
            "stop" => Self::Stop,
            "voices" => Self::Voices,
            "voice" if arg.is_empty() => Self::Voices,
            "voice" => Self::Voice(arg.to_string()),
            "history" => Self::History,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Prompt(line.to_string()),
        }
    }
}

const HELP: &str = "\
Type a prompt and press Enter, or:
  /listen        speak a prompt
  /stop          stop speaking
  /voices        list voices
  /voice <name>  select a voice
  /history       show the conversation
  /quit          exit
Start a prompt with // to send a leading /.";

pub struct ChatSession {
    log: Arc<ConversationLog>,
    speech: Arc<SpeechController>,
    dispatcher: PromptDispatcher,
    pending: Mutex<JoinSet<()>>,
}

impl ChatSession {
    pub fn new(
        log: Arc<ConversationLog>,
        speech: Arc<SpeechController>,
        dispatcher: PromptDispatcher,
    ) -> Self {
        Self {
            log,
            speech,
            dispatcher,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn log(&self) -> &Arc<ConversationLog> {
        &self.log
    }

    pub fn speech(&self) -> &Arc<SpeechController> {
        &self.speech
    }

    /// Dispatch `input` in the background. Blank input is rejected.
    pub fn submit(&self, input: &str) -> bool {
        if input.trim().is_empty() {
            debug!("Ignoring blank prompt");
            return false;
        }

        let dispatcher = self.dispatcher.clone();
        let prompt = input.to_string();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            dispatcher.dispatch(&prompt).await;
        });
        true
    }

    /// Dispatches submitted but not yet answered.
    pub fn pending(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while pending.try_join_next().is_some() {}
        pending.len()
    }

    /// Wait for every submitted prompt to be answered.
    pub async fn drain(&self) {
        let mut pending = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        if !pending.is_empty() {
            debug!("Waiting for {} pending prompt(s)", pending.len());
        }
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("Dispatch task failed: {e}");
            }
        }
    }

    /// Run until `/quit` or until input closes.
    ///
    /// On end of input, pending prompts are answered, printed and spoken
    /// before returning. `/quit` aborts them and stops speaking at once.
    pub async fn run(
        &self,
        mut lines: mpsc::Receiver<String>,
        mut transcripts: mpsc::Receiver<String>,
    ) {
        let mut entries = self.log.subscribe();
        let mut closed = false;
        let voices = self.speech.load_voices().await;
        info!("Session ready ({} voice(s), endpoint {})", voices.len(), self.dispatcher.endpoint());
        println!("{HELP}");

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        debug!("Input closed");
                        closed = true;
                        break;
                    };
                    if !self.handle_command(Command::parse(&line)) {
                        break;
                    }
                }
                transcript = transcripts.recv() => {
                    if let Some(transcript) = transcript {
                        println!("> {transcript}");
                        self.submit(&transcript);
                    }
                }
                entry = entries.recv() => match entry {
                    Ok(entry) => println!("\n{}\n", render_entry(&entry)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Display fell behind by {n} entries");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        if closed {
            self.drain().await;
            loop {
                match entries.try_recv() {
                    Ok(entry) => println!("\n{}\n", render_entry(&entry)),
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!("Display fell behind by {n} entries");
                    }
                    Err(_) => break,
                }
            }
            self.speech.wait_until_silent().await;
        } else {
            self.pending.lock().unwrap_or_else(|e| e.into_inner()).abort_all();
        }

        self.speech.stop_speaking();
    }

    /// Apply one command. Returns `false` when the session should end.
    pub fn handle_command(&self, command: Command) -> bool {
        match command {
            Command::Prompt(prompt) => {
                self.submit(&prompt);
            }
            Command::Listen => {
                if self.speech.start_listening() {
                    println!("Listening...");
                }
            }
            Command::Stop => self.speech.stop_speaking(),
            Command::Voices => println!("{}", self.voice_listing()),
            Command::Voice(name) => {
                if !self.speech.voices().iter().any(|v| v.name == name) {
                    println!("Voice '{name}' is not available right now; the default voice will be used");
                }
                self.speech.select_voice(&name);
            }
            Command::History => {
                if self.log.is_empty() {
                    println!("No conversation yet.");
                } else {
                    println!("{}", self.log.render());
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }

    /// `name (lang)` per voice, the selection marked with `*`.
    pub fn voice_listing(&self) -> String {
        let voices = self.speech.voices();
        if voices.is_empty() {
            return "No voices available.".to_string();
        }
        let selected = self.speech.selected_voice();
        voices
            .iter()
            .map(|v| {
                let mark = if selected.as_deref() == Some(v.name.as_str()) { "*" } else { " " };
                format!("{mark} {v}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
