//! Stage 4: resolving a parked confirmation question.
//!
//! Two machines live here. The duplicate-order decision accepts
//! new/update/no and re-prompts on anything else; the task-update
//! confirmation accepts yes/no and re-asks the original question,
//! reporting expiry if the task has meanwhile vanished. A live
//! confirmation always terminates the message.

use crate::router::DialogueRouter;
use crate::{dates, format};
use quipu_core::{
    entity::{OrderPatch, TaskPatch},
    message::IncomingMessage,
};
use quipu_store::{ConfirmationKind, PendingConfirmation};
use tracing::warn;

impl DialogueRouter {
    pub(crate) async fn resolve_confirmation(
        &self,
        msg: &IncomingMessage,
        text: &str,
        pending: PendingConfirmation,
    ) -> String {
        match pending.kind {
            ConfirmationKind::DuplicateOrder => {
                self.resolve_duplicate_decision(msg, text, pending).await
            }
            ConfirmationKind::TaskUpdate => {
                self.resolve_task_confirmation(msg, text, pending).await
            }
        }
    }

    async fn resolve_duplicate_decision(
        &self,
        msg: &IncomingMessage,
        text: &str,
        pending: PendingConfirmation,
    ) -> String {
        let user = msg.sender_id.as_str();
        let lower = text.trim().to_lowercase();
        let patch: OrderPatch =
            serde_json::from_value(pending.pending_updates.clone()).unwrap_or_default();

        if lower.starts_with("new") {
            let _ = self.store.delete_confirmation(user).await;
            let Some(product) = patch.product.clone() else {
                return format::ask_product();
            };
            let quantity = patch.quantity.unwrap_or(1);
            // Re-parse the user's original date phrase instead of reusing
            // the pre-parsed timestamp, so both creation paths run the same
            // parser against the current clock.
            let fulfill_at = patch.fulfill_raw.as_deref().and_then(dates::parse_due_now);
            return match self
                .store
                .create_order(user, &product, quantity, fulfill_at)
                .await
            {
                Ok(order) => format::order_created(&order),
                Err(e) => {
                    warn!("[{user}] order creation failed: {e}");
                    format::action_apology("create that order")
                }
            };
        }

        if lower.starts_with("update") {
            let _ = self.store.delete_confirmation(user).await;
            return self
                .patch_single_order(user, &pending.subject_id, &patch)
                .await;
        }

        if is_no(&lower) {
            let _ = self.store.delete_confirmation(user).await;
            return format::duplicate_discarded();
        }

        format::duplicate_reprompt()
    }

    async fn resolve_task_confirmation(
        &self,
        msg: &IncomingMessage,
        text: &str,
        pending: PendingConfirmation,
    ) -> String {
        let user = msg.sender_id.as_str();
        let lower = text.trim().to_lowercase();
        let task_id: i64 = pending.subject_id.parse().unwrap_or(-1);

        if is_yes(&lower) {
            let _ = self.store.delete_confirmation(user).await;
            let patch: TaskPatch =
                serde_json::from_value(pending.pending_updates.clone()).unwrap_or_default();
            if patch.is_empty() {
                return format::nothing_to_change();
            }
            return self.patch_single_task(user, task_id, &patch).await;
        }

        if is_no(&lower) {
            let _ = self.store.delete_confirmation(user).await;
            return format::update_cancelled();
        }

        // Anything else: re-ask the original question, keeping the
        // confirmation alive — unless the task has vanished.
        match self.store.get_task(user, task_id).await {
            Ok(Some(task)) => format::task_confirm_question(&task, 1),
            Ok(None) => {
                let _ = self.store.delete_confirmation(user).await;
                format::confirmation_expired()
            }
            Err(e) => {
                warn!("[{user}] task fetch failed during confirmation: {e}");
                format::apology()
            }
        }
    }
}

fn is_yes(lower: &str) -> bool {
    lower == "y" || lower == "confirm" || lower.starts_with("yes")
}

fn is_no(lower: &str) -> bool {
    lower == "n" || lower == "cancel" || lower.starts_with("no")
}
