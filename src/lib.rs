//! voice-prompt: a Gemini prompt proxy and a spoken chat client.
//!
//! The server forwards prompts to the generation API. The client sends
//! typed or spoken prompts to it, keeps the conversation, and reads
//! each reply aloud.

pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod normalizer;
pub mod server;
pub mod session;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
