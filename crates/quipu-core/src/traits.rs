use crate::{
    analysis::Analysis,
    entity::Task,
    error::QuipuError,
    message::{IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One candidate task for a fuzzy update request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMatch {
    pub task_id: i64,
    /// 0.0–1.0 as reported by the classifier.
    pub confidence: f64,
    pub reason: String,
}

/// Result of ranking the user's tasks against free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMatchOutcome {
    pub best: Option<TaskMatch>,
    pub all: Vec<TaskMatch>,
    /// True when the top candidate is shaky or several tasks plausibly fit.
    pub needs_confirmation: bool,
}

/// Intent classifier trait — the language brain.
///
/// Backed by an LLM in production, by scripted stubs in tests. Its output
/// is untrusted either way.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Human-readable classifier name.
    fn name(&self) -> &str;

    /// Extract a structured [`Analysis`] from free text.
    ///
    /// `original` carries the pre-translation variant when the inbound
    /// pipeline translated the message. Malformed model output must degrade
    /// to [`Analysis::unknown`], never to an error — `Err` is reserved for
    /// transport failures.
    async fn classify(&self, text: &str, original: Option<&str>)
        -> Result<Analysis, QuipuError>;

    /// Rank `tasks` against free text for fuzzy update targeting.
    ///
    /// Users rarely know their numeric task IDs, so "mark the dentist thing
    /// done" has to be matched semantically.
    async fn match_task(&self, text: &str, tasks: &[Task])
        -> Result<TaskMatchOutcome, QuipuError>;

    /// Check if the classifier endpoint is reachable.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Messaging Channel trait — the connection to the user.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, QuipuError>;

    /// Send a response back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), QuipuError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), QuipuError>;
}
