//! voice-chat: terminal chat client for voice-prompt-server.
//!
//! Reads prompts from stdin (or the microphone via `/listen`), prints the
//! conversation and speaks every reply.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_prompt::conversation::ConversationLog;
use voice_prompt::dispatch::PromptDispatcher;
use voice_prompt::session::ChatSession;
use voice_prompt::speech::{self, SpeechController};
use voice_prompt::Config;

#[derive(Parser, Debug)]
#[command(name = "voice-chat", about = "Chat with the AI assistant by text or voice")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generation endpoint URL (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Voice name to speak with
    #[arg(long)]
    voice: Option<String>,

    /// Disable spoken replies
    #[arg(long)]
    no_speech: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info,whisper_rs=info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_deref());
    if let Some(endpoint) = args.endpoint {
        config.client.endpoint = Some(endpoint);
    }
    if let Some(voice) = args.voice {
        config.speech.voice = Some(voice);
    }
    if args.no_speech {
        config.speech.synthesizer.enabled = false;
    }

    let (synthesizer, recognizer) = speech::engines_from_config(&config.speech).await?;
    let (transcript_tx, transcript_rx) = mpsc::channel::<String>(16);
    let speech = Arc::new(SpeechController::new(
        synthesizer,
        recognizer,
        &config.speech.language,
        transcript_tx,
    ));
    if let Some(voice) = &config.speech.voice {
        speech.select_voice(voice);
    }

    let log = Arc::new(ConversationLog::new());
    let dispatcher = PromptDispatcher::new(
        config.client_endpoint(),
        Duration::from_secs(config.client_timeout_secs()),
        log.clone(),
        speech.clone(),
    )?;
    info!("Endpoint: {}", dispatcher.endpoint());

    // Forward stdin lines into the session loop. A plain thread, so a read
    // blocked on the terminal does not hold up runtime shutdown after /quit.
    let (line_tx, line_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Chat with AI Assistant");
    let session = ChatSession::new(log, speech, dispatcher);
    session.run(line_rx, transcript_rx).await;

    Ok(())
}
