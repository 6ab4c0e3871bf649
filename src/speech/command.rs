//! Speech engines backed by external programs.
//!
//! Synthesis shells out to espeak-ng (or any CLI with the same flags);
//! recognition runs a user-supplied command that prints one transcript.
//! Children are spawned with `kill_on_drop`, so cancelling the owning
//! task stops the process.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{RecognitionOptions, SpeechRecognizer, SpeechSynthesizer, UtteranceRequest, VoiceOption};
use crate::{Error, Result};

/// espeak-ng amplitude at full volume.
const MAX_AMPLITUDE: f32 = 200.0;

pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    /// Display name → voice identifier accepted by `-v`.
    voice_ids: Mutex<HashMap<String, String>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            voice_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Arguments placed before the generated flags on every call.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    fn voice_id(&self, name: &str) -> String {
        self.voice_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn voices(&self) -> Result<Vec<VoiceOption>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--voices")
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Speech(format!(
                "{} --voices exited with {}",
                self.program, output.status
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_voice_list(&listing);
        debug!("{} reported {} voice(s)", self.program, parsed.len());

        let mut ids = self.voice_ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.clear();
        Ok(parsed
            .into_iter()
            .map(|(voice, id)| {
                ids.insert(voice.name.clone(), id);
                voice
            })
            .collect())
    }

    async fn speak(&self, request: UtteranceRequest) -> Result<()> {
        let amplitude = (request.volume.clamp(0.0, 1.0) * MAX_AMPLITUDE).round() as u32;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg("-a").arg(amplitude.to_string());
        if let Some(voice) = &request.voice {
            cmd.arg("-v").arg(self.voice_id(voice));
        }
        cmd.arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.text.as_bytes()).await?;
            // Closing stdin tells the synthesizer the text is complete
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Speech(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Parse `espeak-ng --voices` output into voices and their `-v` identifiers.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File          Other Languages
///  5  en-us           --/M      English_(America)  gmw/en-US     (en 3)
/// ```
pub fn parse_voice_list(listing: &str) -> Vec<(VoiceOption, String)> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            let file = cols[4];
            let id = file.rsplit('/').next().unwrap_or(file).to_string();
            Some((VoiceOption::new(cols[3], cols[1]), id))
        })
        .collect()
}

pub struct CommandRecognizer {
    argv: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    async fn recognize(&self, options: &RecognitionOptions) -> Result<Option<String>> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(Error::Recognition("no recognizer command configured".into()));
        };

        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace("{lang}", &options.language))
            .collect();
        debug!("Running recognizer: {program} {}", args.join(" "));

        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Recognition(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Recognizer stderr: {}", stderr.trim());
            return Err(Error::Recognition(format!(
                "{program} exited with {}",
                output.status
            )));
        }

        Ok(transcript_from_stdout(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Blank output means the session ended without a result.
fn transcript_from_stdout(stdout: &str) -> Option<String> {
    let transcript = stdout.trim_end_matches(['\r', '\n']);
    if transcript.trim().is_empty() {
        None
    } else {
        Some(transcript.to_string())
    }
}
