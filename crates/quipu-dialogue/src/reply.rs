//! Stage 2: resolving a reply against the list last shown to the user.
//!
//! A reply-reference means "I'm talking about that list you sent". The text
//! still gets classified, but two fallbacks paper over how people actually
//! reply: one-word status keywords ("done") that never classify, and a
//! details heuristic for "tell me about the 2nd one".

use crate::router::DialogueRouter;
use crate::{format, fresh, resolver};
use quipu_core::{
    analysis::{Analysis, Intent},
    entity::{EntityStatus, OrderPatch, TaskPatch},
    message::IncomingMessage,
};
use quipu_store::ConversationContext;
use tracing::warn;

impl DialogueRouter {
    /// Returns `Some(reply)` when the stage claims the message, `None` to
    /// fall through. The classification is left in `cached` on fallthrough
    /// so stage 5 doesn't pay for a second call.
    pub(crate) async fn resolve_reply(
        &self,
        msg: &IncomingMessage,
        text: &str,
        cached: &mut Option<Analysis>,
    ) -> Option<String> {
        let user = msg.sender_id.as_str();

        let context = match self.store.load_context(user).await {
            Ok(Some(ctx)) if ctx.entity_kind.is_some() && ctx.list_len() > 0 => ctx,
            Ok(_) => return None,
            Err(e) => {
                warn!("[{user}] loading context failed: {e}");
                return Some(format::apology());
            }
        };

        let analysis = match cached.take() {
            Some(a) => a,
            None => match self.classifier.classify(text, None).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("[{user}] classify failed in reply stage: {e}");
                    return Some(format::apology());
                }
            },
        };

        // Short replies like "done" rarely parse as structured intents;
        // a bare status keyword synthesizes the update.
        let keyword_status = EntityStatus::from_keyword(text);
        let is_update = analysis.intent == Intent::Update
            || (analysis.intent == Intent::Unknown && keyword_status.is_some());

        if is_update {
            return Some(
                self.apply_reply_update(msg, text, &analysis, keyword_status, &context)
                    .await,
            );
        }

        let lower = text.to_lowercase();
        if analysis.intent == Intent::Get || wants_details(&lower) {
            return Some(self.reply_detail_view(msg, text, &context).await);
        }

        // Not about the shown list after all.
        *cached = Some(analysis);
        None
    }

    /// Apply an update to the items the reply points at. No parseable
    /// reference means "all currently listed items".
    async fn apply_reply_update(
        &self,
        msg: &IncomingMessage,
        text: &str,
        analysis: &Analysis,
        keyword_status: Option<EntityStatus>,
        context: &ConversationContext,
    ) -> String {
        let user = msg.sender_id.as_str();
        let order_like = context
            .entity_kind
            .map(|k| k.is_order_like())
            .unwrap_or(false);

        if order_like {
            let positions = resolver::resolve_multiple(text, context.order_ids.len());
            let ids: Vec<String> = if positions.is_empty() {
                context.order_ids.clone()
            } else {
                positions
                    .iter()
                    .filter_map(|p| context.order_id_at(*p))
                    .map(str::to_string)
                    .collect()
            };

            let mut patch = fresh::order_patch_from(analysis);
            if let Some(s) = keyword_status {
                patch.status = Some(s);
            }
            if patch.is_empty() {
                return format::nothing_to_change();
            }

            if ids.len() == 1 {
                return self.patch_single_order(user, &ids[0], &patch).await;
            }
            // Batch replies are status changes in practice; other fields
            // would be ambiguous across several orders.
            let Some(status) = patch.status else {
                return format::which_one("order");
            };
            return match self.store.bulk_update_order_status(user, &ids, status).await {
                Ok(n) => format::bulk_updated(true, n),
                Err(e) => {
                    warn!("[{user}] bulk order update failed: {e}");
                    format::action_apology("update those orders")
                }
            };
        }

        let positions = resolver::resolve_multiple(text, context.task_ids.len());
        let ids: Vec<i64> = if positions.is_empty() {
            context.task_ids.clone()
        } else {
            positions
                .iter()
                .filter_map(|p| context.task_id_at(*p))
                .collect()
        };

        let mut patch = fresh::task_patch_from(analysis);
        if let Some(s) = keyword_status {
            patch.status = Some(s);
        }
        if patch.is_empty() {
            return format::nothing_to_change();
        }

        if ids.len() == 1 {
            return self.patch_single_task(user, ids[0], &patch).await;
        }
        let Some(status) = patch.status else {
            return format::which_one("task");
        };
        match self.store.bulk_update_task_status(user, &ids, status).await {
            Ok(n) => format::bulk_updated(false, n),
            Err(e) => {
                warn!("[{user}] bulk task update failed: {e}");
                format::action_apology("update those tasks")
            }
        }
    }

    pub(crate) async fn patch_single_order(
        &self,
        user: &str,
        id: &str,
        patch: &OrderPatch,
    ) -> String {
        match self.store.update_order(user, id, patch).await {
            Ok(true) => match self.store.get_order(user, id).await {
                Ok(Some(order)) => format::order_updated(&order),
                _ => format::bulk_updated(true, 1),
            },
            Ok(false) => format::not_found("order"),
            Err(e) => {
                warn!("[{user}] order update failed: {e}");
                format::action_apology("update that order")
            }
        }
    }

    pub(crate) async fn patch_single_task(&self, user: &str, id: i64, patch: &TaskPatch) -> String {
        match self.store.update_task(user, id, patch).await {
            Ok(true) => match self.store.get_task(user, id).await {
                Ok(Some(task)) => format::task_updated(&task),
                _ => format::bulk_updated(false, 1),
            },
            Ok(false) => format::not_found("task"),
            Err(e) => {
                warn!("[{user}] task update failed: {e}");
                format::action_apology("update that task")
            }
        }
    }

    /// Detail view of a single referenced item.
    async fn reply_detail_view(
        &self,
        msg: &IncomingMessage,
        text: &str,
        context: &ConversationContext,
    ) -> String {
        let user = msg.sender_id.as_str();
        let order_like = context
            .entity_kind
            .map(|k| k.is_order_like())
            .unwrap_or(false);
        let noun = if order_like { "order" } else { "task" };

        let Some(pos) = resolver::resolve_single(text, context.list_len()) else {
            return format::which_one(noun);
        };

        if order_like {
            let Some(id) = context.order_id_at(pos) else {
                return format::which_one(noun);
            };
            match self.store.get_order(user, id).await {
                Ok(Some(order)) => format::order_detail(&order),
                Ok(None) => format::not_found(noun),
                Err(e) => {
                    warn!("[{user}] order fetch failed: {e}");
                    format::action_apology("fetch that order")
                }
            }
        } else {
            let Some(id) = context.task_id_at(pos) else {
                return format::which_one(noun);
            };
            match self.store.get_task(user, id).await {
                Ok(Some(task)) => format::task_detail(&task),
                Ok(None) => format::not_found(noun),
                Err(e) => {
                    warn!("[{user}] task fetch failed: {e}");
                    format::action_apology("fetch that task")
                }
            }
        }
    }
}

/// "details", "info", "tell me about", or "show" next to an entity word.
fn wants_details(lower: &str) -> bool {
    lower.contains("detail")
        || lower.contains("information")
        || lower.contains("info")
        || lower.contains("tell me about")
        || (lower.contains("show") && (lower.contains("order") || lower.contains("task")))
}

#[cfg(test)]
mod heuristic_tests {
    use super::wants_details;

    #[test]
    fn test_wants_details() {
        assert!(wants_details("show me details of the 2nd order"));
        assert!(wants_details("more info on 3"));
        assert!(wants_details("tell me about the first one"));
        assert!(wants_details("show task 2"));
        assert!(!wants_details("show me"));
        assert!(!wants_details("done"));
    }
}
