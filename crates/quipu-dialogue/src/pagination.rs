//! Stage 3: "next"/"more" pagination continuation.
//!
//! This stage always terminates the message. With no live cursor it answers
//! with a static terminal line and touches nothing else; with one it fetches
//! the next page under the cursor's saved filters, rewrites the context
//! position maps for the new page, and advances or deletes the cursor.

use crate::format;
use crate::router::DialogueRouter;
use quipu_core::message::IncomingMessage;
use quipu_store::{ConversationContext, PaginationCursor};
use tracing::warn;

impl DialogueRouter {
    pub(crate) async fn continue_pagination(&self, msg: &IncomingMessage) -> String {
        let user = msg.sender_id.as_str();

        let cursor = match self.store.load_cursor(user).await {
            Ok(Some(c)) => c,
            Ok(None) => return format::NO_MORE_ITEMS.to_string(),
            Err(e) => {
                warn!("[{user}] loading cursor failed: {e}");
                return format::apology();
            }
        };

        let page = self.config.page_size;
        let offset = cursor.page_offset + page;

        if cursor.entity_kind.is_order_like() {
            let (orders, total) = match self
                .store
                .get_orders(user, &cursor.filters, offset, page)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("[{user}] order page fetch failed: {e}");
                    return format::action_apology("fetch your orders");
                }
            };
            if orders.is_empty() {
                let _ = self.store.delete_cursor(user, cursor.entity_kind).await;
                return format::NO_MORE_ITEMS.to_string();
            }

            let ctx = ConversationContext::from_orders(user, &orders);
            if let Err(e) = self.store.save_context(&ctx).await {
                warn!("[{user}] saving context failed: {e}");
            }

            let has_more = offset + page < total;
            self.advance_or_delete(cursor, offset, total, has_more).await;
            format::order_list(&orders, offset, total, has_more)
        } else {
            let (tasks, total) = match self.store.get_tasks(user, offset, page).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("[{user}] task page fetch failed: {e}");
                    return format::action_apology("fetch your tasks");
                }
            };
            if tasks.is_empty() {
                let _ = self.store.delete_cursor(user, cursor.entity_kind).await;
                return format::NO_MORE_ITEMS.to_string();
            }

            let ctx = ConversationContext::from_tasks(user, &tasks);
            if let Err(e) = self.store.save_context(&ctx).await {
                warn!("[{user}] saving context failed: {e}");
            }

            let has_more = offset + page < total;
            self.advance_or_delete(cursor, offset, total, has_more).await;
            format::task_list(&tasks, offset, total, has_more)
        }
    }

    async fn advance_or_delete(
        &self,
        cursor: PaginationCursor,
        offset: i64,
        total: i64,
        has_more: bool,
    ) {
        let user = cursor.user_id.clone();
        if has_more {
            // Walking the list keeps the cursor alive.
            let expires_at =
                chrono::Utc::now() + chrono::Duration::minutes(self.config.cursor_ttl_minutes);
            let advanced = PaginationCursor {
                page_offset: offset,
                total_count: total,
                expires_at,
                ..cursor
            };
            if let Err(e) = self.store.save_cursor(&advanced).await {
                warn!("[{user}] advancing cursor failed: {e}");
            }
        } else if let Err(e) = self.store.delete_cursor(&user, cursor.entity_kind).await {
            warn!("[{user}] deleting cursor failed: {e}");
        }
    }
}
