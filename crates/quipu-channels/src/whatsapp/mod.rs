//! WhatsApp Cloud API channel.
//!
//! Inbound: an axum webhook listener handling Meta's GET verification
//! handshake and POST notifications. Outbound: `sendMessage` against the
//! Graph API. Docs: <https://developers.facebook.com/docs/whatsapp/cloud-api>

pub(crate) mod types;


use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use quipu_core::{
    config::WhatsAppConfig,
    error::QuipuError,
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v21.0";

/// WhatsApp Cloud API channel: webhook in, Graph API out.
pub struct WhatsAppChannel {
    config: WhatsAppConfig,
    client: reqwest::Client,
    server: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Shared state for the webhook handlers.
#[derive(Clone)]
struct WebhookState {
    verify_token: String,
    tx: mpsc::Sender<IncomingMessage>,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            server: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, QuipuError> {
        let (tx, rx) = mpsc::channel::<IncomingMessage>(256);

        let state = WebhookState {
            verify_token: self.config.verify_token.clone(),
            tx,
        };

        let app = Router::new()
            .route("/webhook", get(verify_webhook).post(receive_webhook))
            .with_state(state);

        let addr = self.config.listen_addr.clone();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| QuipuError::Channel(format!("failed to bind {addr}: {e}")))?;

        info!("WhatsApp webhook listening on {addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("whatsapp webhook server exited: {e}");
            }
        });
        *self.server.lock().await = Some(handle);

        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), QuipuError> {
        let Some(to) = message.reply_target else {
            warn!("whatsapp: outgoing message without a target, dropping");
            return Ok(());
        };

        let url = format!(
            "{GRAPH_API_BASE}/{}/messages",
            self.config.phone_number_id
        );
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": message.text },
        });

        let resp = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.access_token),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| QuipuError::Channel(format!("whatsapp send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(QuipuError::Channel(format!(
                "whatsapp send returned {status}: {text}"
            )));
        }

        Ok(())
    }

    async fn stop(&self) -> Result<(), QuipuError> {
        if let Some(handle) = self.server.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

/// Meta's subscription handshake: echo `hub.challenge` when the token matches.
async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == Some("subscribe") && token == Some(state.verify_token.as_str()) {
        (StatusCode::OK, challenge)
    } else {
        warn!("whatsapp webhook verification failed");
        (StatusCode::FORBIDDEN, String::new())
    }
}

/// Notification delivery. Always 200 — Meta retries aggressively on
/// anything else, and a malformed notification won't improve with retries.
async fn receive_webhook(
    State(state): State<WebhookState>,
    Json(payload): Json<types::WebhookPayload>,
) -> StatusCode {
    for message in types::to_incoming(payload) {
        if state.tx.send(message).await.is_err() {
            warn!("whatsapp: gateway receiver dropped, discarding message");
        }
    }
    StatusCode::OK
}
