//! Stage 5: fresh classification and the (intent, entity) routing table.
//!
//! Entry point for messages no earlier stage claimed. Also home to the
//! duplicate-order gate and the fuzzy task matcher, both of which can park
//! a confirmation instead of acting.

use crate::router::DialogueRouter;
use crate::{dates, format};
use chrono::{Duration, Utc};
use quipu_core::{
    analysis::{Analysis, EntityKind, Intent},
    entity::{EntityStatus, OrderFilters, OrderPatch, TaskPatch},
    message::IncomingMessage,
};
use quipu_store::{ConfirmationKind, ConversationContext, PaginationCursor, PendingConfirmation};
use tracing::{debug, warn};

impl DialogueRouter {
    pub(crate) async fn dispatch_fresh(
        &self,
        msg: &IncomingMessage,
        text: &str,
        cached: Option<Analysis>,
    ) -> String {
        let user = msg.sender_id.as_str();
        let analysis = match cached {
            Some(a) => a,
            None => match self.classifier.classify(text, None).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("[{user}] classification failed: {e}");
                    return format::apology();
                }
            },
        };
        debug!(
            "[{user}] classified intent={:?} entity={:?}",
            analysis.intent, analysis.entity
        );

        match (analysis.intent, analysis.entity) {
            (Intent::Create, e) if e.is_task_like() => {
                self.create_task_from(msg, &analysis, text).await
            }
            (Intent::Create, e) if e.is_order_like() => self.create_order_from(msg, &analysis).await,
            (Intent::Get, e) if e.is_task_like() => self.list_tasks(msg).await,
            (Intent::Get, e) if e.is_order_like() => {
                self.get_orders_or_detail(msg, &analysis).await
            }
            (Intent::Update, e) if e.is_task_like() => {
                self.update_task_fuzzy(msg, text, &analysis).await
            }
            (Intent::Update, e) if e.is_order_like() => {
                self.update_order_by_id(msg, &analysis).await
            }
            (Intent::Unknown, _) => format::help(),
            _ => format::guidance(),
        }
    }

    async fn create_task_from(
        &self,
        msg: &IncomingMessage,
        analysis: &Analysis,
        text: &str,
    ) -> String {
        let user = msg.sender_id.as_str();
        let title = analysis.param_str("title").unwrap_or(text);
        let description = analysis.param_str("description");
        let due_at = analysis
            .param_str("due_date")
            .and_then(dates::parse_due_now);

        match self
            .store
            .create_task(user, title, description, due_at)
            .await
        {
            Ok(task) => format::task_created(&task),
            Err(e) => {
                warn!("[{user}] task creation failed: {e}");
                format::action_apology("create that task")
            }
        }
    }

    /// Order creation behind the duplicate gate. Shared with the
    /// forwarded-message override.
    pub(crate) async fn create_order_from(
        &self,
        msg: &IncomingMessage,
        analysis: &Analysis,
    ) -> String {
        let user = msg.sender_id.as_str();
        let Some(product) = analysis.param_str("product") else {
            return format::ask_product();
        };
        let quantity = analysis.param_i64("quantity").unwrap_or(1).max(1);
        let fulfill_raw = analysis
            .param_str("fulfillment_date")
            .or_else(|| analysis.param_str("date"));
        let fulfill_at = fulfill_raw.and_then(dates::parse_due_now);

        // Duplicate gate: an identical pending order within the window
        // parks a decision instead of inserting a second row.
        match self
            .store
            .find_duplicate_pending_order(
                user,
                product,
                quantity,
                fulfill_at,
                self.config.duplicate_window_secs,
            )
            .await
        {
            Ok(Some(existing)) => {
                let patch = OrderPatch {
                    product: Some(product.to_string()),
                    quantity: Some(quantity),
                    status: None,
                    fulfill_at,
                    fulfill_raw: fulfill_raw.map(str::to_string),
                };
                let now = Utc::now();
                let pending = PendingConfirmation {
                    user_id: user.to_string(),
                    kind: ConfirmationKind::DuplicateOrder,
                    subject_id: existing.id.clone(),
                    pending_updates: serde_json::to_value(&patch)
                        .unwrap_or(serde_json::Value::Null),
                    original_text: msg.text.clone(),
                    created_at: now,
                    expires_at: now + Duration::minutes(self.config.confirmation_ttl_minutes),
                };
                if let Err(e) = self.store.save_confirmation(&pending).await {
                    warn!("[{user}] parking duplicate decision failed: {e}");
                    return format::action_apology("create that order");
                }
                format::duplicate_order_question(&existing)
            }
            Ok(None) => match self
                .store
                .create_order(user, product, quantity, fulfill_at)
                .await
            {
                Ok(order) => format::order_created(&order),
                Err(e) => {
                    warn!("[{user}] order creation failed: {e}");
                    format::action_apology("create that order")
                }
            },
            Err(e) => {
                warn!("[{user}] duplicate probe failed: {e}");
                format::action_apology("create that order")
            }
        }
    }

    async fn list_tasks(&self, msg: &IncomingMessage) -> String {
        let user = msg.sender_id.as_str();
        let page = self.config.page_size;

        let (tasks, total) = match self.store.get_tasks(user, 0, page).await {
            Ok(r) => r,
            Err(e) => {
                warn!("[{user}] task list fetch failed: {e}");
                return format::action_apology("fetch your tasks");
            }
        };
        if tasks.is_empty() {
            return format::no_tasks_yet();
        }

        let ctx = ConversationContext::from_tasks(user, &tasks);
        if let Err(e) = self.store.save_context(&ctx).await {
            warn!("[{user}] saving context failed: {e}");
        }

        let has_more = page < total;
        self.reset_cursor(user, EntityKind::Task, total, OrderFilters::default(), has_more)
            .await;
        format::task_list(&tasks, 0, total, has_more)
    }

    async fn get_orders_or_detail(&self, msg: &IncomingMessage, analysis: &Analysis) -> String {
        let user = msg.sender_id.as_str();

        // An explicit order ID short-circuits to the detail view.
        if let Some(order_id) = extract_order_id(analysis, &msg.text) {
            return match self.store.get_order(user, &order_id).await {
                Ok(Some(order)) => format::order_detail(&order),
                Ok(None) => format::not_found("order"),
                Err(e) => {
                    warn!("[{user}] order fetch failed: {e}");
                    format::action_apology("fetch that order")
                }
            };
        }

        let filters = order_filters_from(analysis);
        let page = self.config.page_size;
        let (orders, total) = match self.store.get_orders(user, &filters, 0, page).await {
            Ok(r) => r,
            Err(e) => {
                warn!("[{user}] order list fetch failed: {e}");
                return format::action_apology("fetch your orders");
            }
        };
        if orders.is_empty() {
            return format::order_list(&orders, 0, 0, false);
        }

        let ctx = ConversationContext::from_orders(user, &orders);
        if let Err(e) = self.store.save_context(&ctx).await {
            warn!("[{user}] saving context failed: {e}");
        }

        let has_more = page < total;
        self.reset_cursor(user, EntityKind::Order, total, filters, has_more)
            .await;
        format::order_list(&orders, 0, total, has_more)
    }

    /// Fuzzy task update: users rarely know task IDs, so the classifier
    /// ranks the full task list against the request.
    async fn update_task_fuzzy(
        &self,
        msg: &IncomingMessage,
        text: &str,
        analysis: &Analysis,
    ) -> String {
        let user = msg.sender_id.as_str();

        let tasks = match self.store.all_tasks(user).await {
            Ok(t) => t,
            Err(e) => {
                warn!("[{user}] task fetch failed: {e}");
                return format::action_apology("fetch your tasks");
            }
        };
        if tasks.is_empty() {
            return format::no_tasks_yet();
        }

        let outcome = match self.classifier.match_task(text, &tasks).await {
            Ok(o) => o,
            Err(e) => {
                warn!("[{user}] task matching failed: {e}");
                return format::apology();
            }
        };
        let Some(best) = outcome.best else {
            return format::no_matching_task();
        };
        let Some(task) = tasks.iter().find(|t| t.id == best.task_id) else {
            // The classifier pointed at a task it wasn't given.
            return format::no_matching_task();
        };

        // The classifier's flag is untrusted; recompute from the confidences.
        let strong_candidates = outcome.all.iter().filter(|m| m.confidence > 0.6).count();
        let needs_confirmation =
            outcome.needs_confirmation || best.confidence < 0.8 || strong_candidates > 1;

        let mut patch = task_patch_from(analysis);
        if patch.status.is_none() {
            if let Some(s) = EntityStatus::from_keyword(text) {
                patch.status = Some(s);
            }
        }
        if patch.is_empty() {
            return format::nothing_to_change();
        }

        if needs_confirmation {
            let now = Utc::now();
            let pending = PendingConfirmation {
                user_id: user.to_string(),
                kind: ConfirmationKind::TaskUpdate,
                subject_id: best.task_id.to_string(),
                pending_updates: serde_json::to_value(&patch).unwrap_or(serde_json::Value::Null),
                original_text: msg.text.clone(),
                created_at: now,
                expires_at: now + Duration::minutes(self.config.task_confirmation_ttl_minutes),
            };
            if let Err(e) = self.store.save_confirmation(&pending).await {
                warn!("[{user}] parking task confirmation failed: {e}");
                return format::action_apology("update that task");
            }
            return format::task_confirm_question(task, strong_candidates.max(1));
        }

        self.patch_single_task(user, best.task_id, &patch).await
    }

    /// Order updates require an explicit ID — order IDs are always shown to
    /// users, so there is no fuzzy matching here.
    async fn update_order_by_id(&self, msg: &IncomingMessage, analysis: &Analysis) -> String {
        let user = msg.sender_id.as_str();
        let Some(order_id) = extract_order_id(analysis, &msg.text) else {
            return format::ask_order_id();
        };

        let mut patch = order_patch_from(analysis);
        if patch.status.is_none() {
            if let Some(s) = EntityStatus::from_keyword(&msg.text) {
                patch.status = Some(s);
            }
        }
        if patch.is_empty() {
            return format::nothing_to_change();
        }

        self.patch_single_order(user, &order_id, &patch).await
    }

    /// Keep the (user, kind) cursor in sync with a fresh page-0 listing.
    async fn reset_cursor(
        &self,
        user: &str,
        kind: EntityKind,
        total: i64,
        filters: OrderFilters,
        has_more: bool,
    ) {
        if has_more {
            let now = Utc::now();
            let cursor = PaginationCursor {
                user_id: user.to_string(),
                entity_kind: kind,
                page_offset: 0,
                total_count: total,
                filters,
                expires_at: now + Duration::minutes(self.config.cursor_ttl_minutes),
            };
            if let Err(e) = self.store.save_cursor(&cursor).await {
                warn!("[{user}] saving cursor failed: {e}");
            }
        } else if let Err(e) = self.store.delete_cursor(user, kind).await {
            warn!("[{user}] clearing stale cursor failed: {e}");
        }
    }
}

/// Build a task patch from classifier parameters. Update requests use
/// `new_title`/`new_description` so the phrase that *identifies* the task
/// never overwrites its title.
pub(crate) fn task_patch_from(analysis: &Analysis) -> TaskPatch {
    TaskPatch {
        title: analysis.param_str("new_title").map(str::to_string),
        description: analysis.param_str("new_description").map(str::to_string),
        status: analysis
            .param_str("status")
            .and_then(EntityStatus::parse),
        due_at: analysis.param_str("due_date").and_then(dates::parse_due_now),
    }
}

/// Build an order patch from classifier parameters.
pub(crate) fn order_patch_from(analysis: &Analysis) -> OrderPatch {
    let fulfill_raw = analysis
        .param_str("fulfillment_date")
        .or_else(|| analysis.param_str("date"));
    OrderPatch {
        product: analysis.param_str("new_product").map(str::to_string),
        quantity: analysis.param_i64("quantity"),
        status: analysis
            .param_str("status")
            .and_then(EntityStatus::parse),
        fulfill_at: fulfill_raw.and_then(dates::parse_due_now),
        fulfill_raw: fulfill_raw.map(str::to_string),
    }
}

/// Explicit order ID from the parameter bag, or an "ORD-…" token typed in
/// the message itself when the classifier missed it.
fn extract_order_id(analysis: &Analysis, text: &str) -> Option<String> {
    if let Some(id) = analysis
        .param_str("order_id")
        .or_else(|| analysis.param_str("id"))
    {
        return Some(id.to_string());
    }
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-'))
        .find(|w| w.len() > 4 && w.to_uppercase().starts_with("ORD-"))
        .map(str::to_string)
}

fn order_filters_from(analysis: &Analysis) -> OrderFilters {
    OrderFilters {
        status: analysis
            .param_str("status")
            .and_then(EntityStatus::parse),
        from: analysis
            .param_str("from_date")
            .or_else(|| analysis.param_str("start_date"))
            .and_then(dates::parse_due_now),
        to: analysis
            .param_str("to_date")
            .or_else(|| analysis.param_str("end_date"))
            .and_then(dates::parse_due_now),
    }
}
