//! Conversation log: append-only record of prompts and their replies.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const SUBSCRIBER_CAPACITY: usize = 64;

/// One prompt and the text shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub prompt: String,
    pub response: String,
}

impl ConversationEntry {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

/// Ordered session history. Entries are never changed or removed.
pub struct ConversationLog {
    entries: Mutex<Vec<ConversationEntry>>,
    tx: broadcast::Sender<ConversationEntry>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            entries: Mutex::new(Vec::new()),
            tx,
        }
    }

    /// Append an entry and notify subscribers.
    pub fn append(&self, entry: ConversationEntry) {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push(entry.clone());
            debug!("Conversation entry #{} appended", entries.len());
        }
        // No subscribers is fine
        let _ = self.tx.send(entry);
    }

    /// Snapshot of all entries in insertion order.
    pub fn all(&self) -> Vec<ConversationEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive every entry appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEntry> {
        self.tx.subscribe()
    }

    /// Render the whole history for display.
    pub fn render(&self) -> String {
        self.all()
            .iter()
            .map(render_entry)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Render a single entry the way the chat view shows it.
pub fn render_entry(entry: &ConversationEntry) -> String {
    format!("You: {}\n{}", entry.prompt, entry.response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_insertion_order() {
        let log = ConversationLog::new();
        assert!(log.is_empty());

        log.append(ConversationEntry::new("a", "1. x"));
        log.append(ConversationEntry::new("b", "1. y"));

        let all = log.all();
        assert_eq!(log.len(), 2);
        assert_eq!(all[0].prompt, "a");
        assert_eq!(all[1].prompt, "b");
    }

    #[test]
    fn render_shows_prompt_then_response() {
        let log = ConversationLog::new();
        log.append(ConversationEntry::new("hi", "1. hello"));
        log.append(ConversationEntry::new("again", "Failed to load text"));

        assert_eq!(
            log.render(),
            "You: hi\n1. hello\n\nYou: again\nFailed to load text"
        );
    }

    #[tokio::test]
    async fn subscribers_see_new_entries() {
        let log = ConversationLog::new();
        log.append(ConversationEntry::new("before", "x"));

        let mut rx = log.subscribe();
        log.append(ConversationEntry::new("after", "y"));

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.prompt, "after");
    }
}
