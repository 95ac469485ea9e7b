use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "whatsapp").
    pub channel: String,
    /// Platform-specific user ID (WhatsApp: the sender's phone number).
    pub sender_id: String,
    /// Human-readable sender name, when the platform provides one.
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// If this is a reply, the platform message ID of the quoted message.
    pub reply_to: Option<String>,
    /// Whether the platform flagged this message as forwarded.
    #[serde(default)]
    pub forwarded: bool,
    /// Platform-specific target for routing the response.
    #[serde(default)]
    pub reply_target: Option<String>,
}

/// An outgoing message to send back through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Platform-specific target for routing.
    #[serde(default)]
    pub reply_target: Option<String>,
}
