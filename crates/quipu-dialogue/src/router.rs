//! The priority chain. One inbound message runs through the stages in a
//! fixed order and the first stage that claims it wins.

use crate::format;
use quipu_core::{
    analysis::{Analysis, Intent},
    config::DialogueConfig,
    message::{IncomingMessage, OutgoingMessage},
    traits::Classifier,
};
use quipu_store::Store;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves inbound messages against per-user conversational state.
pub struct DialogueRouter {
    pub(crate) store: Store,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) config: DialogueConfig,
}

impl DialogueRouter {
    pub fn new(store: Store, classifier: Arc<dyn Classifier>, config: DialogueConfig) -> Self {
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Resolve one inbound message into exactly one reply.
    ///
    /// Infallible by design: every collaborator failure is caught at its
    /// stage boundary and degrades to a plain-language apology. Nothing
    /// here ever surfaces an error code to the user.
    pub async fn handle(&self, msg: &IncomingMessage) -> OutgoingMessage {
        let text = msg.text.trim().to_string();
        let reply = self.resolve(msg, &text).await;
        OutgoingMessage {
            text: reply,
            reply_target: msg.reply_target.clone(),
        }
    }

    async fn resolve(&self, msg: &IncomingMessage, text: &str) -> String {
        let user = msg.sender_id.as_str();
        // At most one classifier call per message; stages hand the result down.
        let mut cached: Option<Analysis> = None;

        // Stage 1 — forwarded override. Forwarded content (a shared product
        // listing, a re-sent request) is an order regardless of phrasing,
        // unless it clearly classifies as get/update.
        if msg.forwarded {
            match self.classifier.classify(text, None).await {
                Ok(analysis) => {
                    if matches!(analysis.intent, Intent::Create | Intent::Unknown) {
                        debug!("[{user}] forwarded message routed to order creation");
                        return self.create_order_from(msg, &analysis).await;
                    }
                    cached = Some(analysis);
                }
                Err(e) => {
                    warn!("[{user}] classifier failed on forwarded message: {e}");
                    return format::apology();
                }
            }
        }

        // Stage 2 — reply to a previously shown list.
        if msg.reply_to.is_some() {
            if let Some(reply) = self.resolve_reply(msg, text, &mut cached).await {
                return reply;
            }
        }

        // Stage 3 — pagination continuation. Claims the literal "next"/"more"
        // even while a confirmation is pending; the stage order is strict.
        if is_pagination_trigger(text) {
            return self.continue_pagination(msg).await;
        }

        // Stage 4 — pending confirmation. A live record always terminates
        // the message here, never falling through to fresh classification.
        match self.store.load_confirmation(user).await {
            Ok(Some(pending)) => return self.resolve_confirmation(msg, text, pending).await,
            Ok(None) => {}
            Err(e) => {
                warn!("[{user}] loading confirmation failed: {e}");
                return format::apology();
            }
        }

        // Stage 5 — fresh classification.
        self.dispatch_fresh(msg, text, cached).await
    }
}

/// "next", "more", or anything starting with "next" continues pagination.
pub(crate) fn is_pagination_trigger(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    t == "more" || t.starts_with("next")
}

#[cfg(test)]
mod trigger_tests {
    use super::is_pagination_trigger;

    #[test]
    fn test_pagination_triggers() {
        assert!(is_pagination_trigger("next"));
        assert!(is_pagination_trigger("Next"));
        assert!(is_pagination_trigger("  NEXT  "));
        assert!(is_pagination_trigger("more"));
        assert!(is_pagination_trigger("next please"));
        assert!(!is_pagination_trigger("show more orders"));
        assert!(!is_pagination_trigger("done"));
    }
}
