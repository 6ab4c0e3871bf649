//! voice-prompt-server: HTTP proxy in front of the Gemini API.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voice_prompt::generation::GeminiGenerator;
use voice_prompt::server::{self, ProxyState};
use voice_prompt::Config;

#[derive(Parser, Debug)]
#[command(name = "voice-prompt-server", about = "Prompt proxy for the Gemini API")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref());
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // A missing key is not fatal: every request then answers with the 500 body
    let api_key = config.generation.api_key();
    if api_key.is_none() {
        warn!(
            "{} is not set, generation requests will fail",
            config.generation.api_key_env
        );
    }

    let generator = GeminiGenerator::new(&config.generation, api_key)?;
    info!("Using model {}", config.generation.model);

    let state = ProxyState {
        generator: Arc::new(generator),
        default_prompt: config.server.default_prompt.clone(),
    };

    server::serve(state, &config.server).await?;
    Ok(())
}
