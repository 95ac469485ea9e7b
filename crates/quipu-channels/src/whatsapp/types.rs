//! WhatsApp Cloud API webhook payload types.
//!
//! Only the fields the dialogue core needs survive here: sender, text,
//! the reply context ID, and the forwarded flags. Everything else in the
//! notification is ignored by serde.

use chrono::{DateTime, Utc};
use quipu_core::message::IncomingMessage;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: Option<String>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub from: Option<String>,
    pub id: Option<String>,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<TextBody>,
    pub context: Option<MessageContext>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Reply/forward metadata. `id` points at the quoted message when the user
/// swiped to reply.
#[derive(Debug, Deserialize)]
pub struct MessageContext {
    pub id: Option<String>,
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default)]
    pub frequently_forwarded: bool,
}

/// Flatten one webhook notification into the core message type. Non-text
/// messages are dropped.
pub fn to_incoming(payload: WebhookPayload) -> Vec<IncomingMessage> {
    let mut out = Vec::new();
    for entry in payload.entry {
        for change in entry.changes {
            let sender_name = change
                .value
                .contacts
                .first()
                .and_then(|c| c.profile.as_ref())
                .and_then(|p| p.name.clone());

            for msg in change.value.messages {
                if msg.kind.as_deref() != Some("text") {
                    continue;
                }
                let Some(text) = msg.text.map(|t| t.body) else {
                    continue;
                };
                let Some(from) = msg.from else {
                    continue;
                };

                let timestamp = msg
                    .timestamp
                    .as_deref()
                    .and_then(|t| t.parse::<i64>().ok())
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_else(Utc::now);

                let (reply_to, forwarded) = match msg.context {
                    Some(ctx) => (ctx.id, ctx.forwarded || ctx.frequently_forwarded),
                    None => (None, false),
                };

                out.push(IncomingMessage {
                    id: Uuid::new_v4(),
                    channel: "whatsapp".to_string(),
                    sender_id: from.clone(),
                    sender_name: sender_name.clone(),
                    text,
                    timestamp,
                    reply_to,
                    forwarded,
                    reply_target: Some(from),
                });
            }
        }
    }
    out
}
