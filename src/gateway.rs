//! Gateway — the event loop connecting channels to the dialogue router.
//!
//! One spawned task per inbound message; messages from different users run
//! concurrently, and two messages from the same user racing each other is
//! an accepted last-writer-wins case (WhatsApp delivery is effectively
//! serialized per sender).

use quipu_core::{message::IncomingMessage, traits::Channel};
use quipu_dialogue::DialogueRouter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

pub struct Gateway {
    router: Arc<DialogueRouter>,
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl Gateway {
    pub fn new(router: DialogueRouter, channels: HashMap<String, Arc<dyn Channel>>) -> Self {
        Self {
            router: Arc::new(router),
            channels,
        }
    }

    /// Run the main event loop.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Quipu gateway running | channels: {}",
            self.channels.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {name}: {e}"))?;
            let tx = tx.clone();
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = channel_rx.recv().await {
                    if tx.send(msg).await.is_err() {
                        info!("gateway receiver dropped, stopping {channel_name} forwarder");
                        break;
                    }
                }
            });

            info!("Channel started: {name}");
        }

        drop(tx);

        while let Some(msg) = rx.recv().await {
            let gw = self.clone();
            tokio::spawn(async move {
                gw.handle_message(msg).await;
            });
        }

        Ok(())
    }

    async fn handle_message(&self, msg: IncomingMessage) {
        let preview = if msg.text.chars().count() > 60 {
            let truncated: String = msg.text.chars().take(60).collect();
            format!("{truncated}...")
        } else {
            msg.text.clone()
        };
        info!(
            "[{}] {} says: {}",
            msg.channel,
            msg.sender_name.as_deref().unwrap_or("unknown"),
            preview
        );

        let response = self.router.handle(&msg).await;

        let Some(channel) = self.channels.get(&msg.channel) else {
            error!("no channel found for '{}'", msg.channel);
            return;
        };
        if let Err(e) = channel.send(response).await {
            error!("failed to send response via {}: {e}", msg.channel);
        }
    }
}
