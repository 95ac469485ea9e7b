//! Per-user dialogue state: the conversation context slot, pending
//! confirmations, and pagination cursors.
//!
//! All three are single-slot upserts keyed by user (cursors: user + entity
//! kind). TTLs are enforced by comparing `expires_at` at read time; an
//! expired row is simply treated as absent until the next upsert replaces it.

use super::{fmt_ts, parse_ts, Store};
use chrono::{DateTime, Utc};
use quipu_core::analysis::EntityKind;
use quipu_core::entity::{Order, OrderFilters, Task};
use quipu_core::error::QuipuError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which question a pending confirmation is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationKind {
    /// "Did you mean this task? yes/no"
    TaskUpdate,
    /// "This looks like a duplicate order — new or update?"
    DuplicateOrder,
}

impl ConfirmationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationKind::TaskUpdate => "task-update",
            ConfirmationKind::DuplicateOrder => "duplicate-order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "task-update" => Some(ConfirmationKind::TaskUpdate),
            "duplicate-order" => Some(ConfirmationKind::DuplicateOrder),
            _ => None,
        }
    }
}

/// The last list shown to a user, as they saw it.
///
/// Position maps go from 1-based display position (string key, the JSON
/// column is an object) to the actual identifier. Lists and maps are always
/// written together so `order_positions["3"] == order_ids[2]`; readers fall
/// back from map to list by position when a map entry is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    pub entity_kind: Option<EntityKind>,
    pub task_ids: Vec<i64>,
    pub order_ids: Vec<String>,
    pub task_positions: BTreeMap<String, i64>,
    pub order_positions: BTreeMap<String, String>,
}

impl ConversationContext {
    /// Snapshot a rendered task list.
    pub fn from_tasks(user_id: &str, tasks: &[Task]) -> Self {
        let task_ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();
        let task_positions = task_ids
            .iter()
            .enumerate()
            .map(|(i, id)| ((i + 1).to_string(), *id))
            .collect();
        Self {
            user_id: user_id.to_string(),
            entity_kind: Some(EntityKind::Task),
            task_ids,
            task_positions,
            ..Default::default()
        }
    }

    /// Snapshot a rendered order list.
    pub fn from_orders(user_id: &str, orders: &[Order]) -> Self {
        let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
        let order_positions = order_ids
            .iter()
            .enumerate()
            .map(|(i, id)| ((i + 1).to_string(), id.clone()))
            .collect();
        Self {
            user_id: user_id.to_string(),
            entity_kind: Some(EntityKind::Order),
            order_ids,
            order_positions,
            ..Default::default()
        }
    }

    /// How many items the remembered list has for its entity kind.
    pub fn list_len(&self) -> usize {
        match self.entity_kind {
            Some(k) if k.is_order_like() => self.order_ids.len(),
            Some(k) if k.is_task_like() => self.task_ids.len(),
            _ => 0,
        }
    }

    /// Task ID at a 1-based display position, map first, list as fallback.
    pub fn task_id_at(&self, pos: usize) -> Option<i64> {
        self.task_positions
            .get(&pos.to_string())
            .copied()
            .or_else(|| {
                pos.checked_sub(1)
                    .and_then(|i| self.task_ids.get(i).copied())
            })
    }

    /// Order ID at a 1-based display position, map first, list as fallback.
    pub fn order_id_at(&self, pos: usize) -> Option<&str> {
        self.order_positions
            .get(&pos.to_string())
            .map(String::as_str)
            .or_else(|| {
                pos.checked_sub(1)
                    .and_then(|i| self.order_ids.get(i))
                    .map(String::as_str)
            })
    }
}

/// A parked question waiting for the user's answer. At most one per user;
/// a new one replaces whatever was pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub user_id: String,
    pub kind: ConfirmationKind,
    /// Task id or order id the question concerns.
    pub subject_id: String,
    /// Serialized `TaskPatch` / `OrderPatch` to apply on confirmation.
    pub pending_updates: serde_json::Value,
    /// Raw text that triggered the question, kept for audit and re-asking.
    pub original_text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Where the user is in a paginated listing. At most one per user and
/// entity kind; deleted once the listing is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationCursor {
    pub user_id: String,
    pub entity_kind: EntityKind,
    /// Offset of the page the user last saw.
    pub page_offset: i64,
    pub total_count: i64,
    /// Filter snapshot so every page of one listing is consistent.
    pub filters: OrderFilters,
    pub expires_at: DateTime<Utc>,
}

impl Store {
    /// Upsert the user's context slot.
    pub async fn save_context(&self, ctx: &ConversationContext) -> Result<(), QuipuError> {
        let task_ids = serde_json::to_string(&ctx.task_ids)?;
        let order_ids = serde_json::to_string(&ctx.order_ids)?;
        let task_positions = serde_json::to_string(&ctx.task_positions)?;
        let order_positions = serde_json::to_string(&ctx.order_positions)?;

        sqlx::query(
            "INSERT INTO conversation_context \
             (user_id, entity_kind, task_ids, order_ids, task_positions, order_positions, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, datetime('now')) \
             ON CONFLICT(user_id) DO UPDATE SET \
               entity_kind = excluded.entity_kind, \
               task_ids = excluded.task_ids, \
               order_ids = excluded.order_ids, \
               task_positions = excluded.task_positions, \
               order_positions = excluded.order_positions, \
               updated_at = datetime('now')",
        )
        .bind(&ctx.user_id)
        .bind(ctx.entity_kind.map(|k| k.as_str()))
        .bind(task_ids)
        .bind(order_ids)
        .bind(task_positions)
        .bind(order_positions)
        .execute(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("save context failed: {e}")))?;

        Ok(())
    }

    /// Load the user's context slot, if any.
    pub async fn load_context(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationContext>, QuipuError> {
        let row: Option<(Option<String>, String, String, String, String)> = sqlx::query_as(
            "SELECT entity_kind, task_ids, order_ids, task_positions, order_positions \
             FROM conversation_context WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("load context failed: {e}")))?;

        let Some((entity_kind, task_ids, order_ids, task_positions, order_positions)) = row else {
            return Ok(None);
        };

        Ok(Some(ConversationContext {
            user_id: user_id.to_string(),
            entity_kind: entity_kind.as_deref().map(EntityKind::parse),
            task_ids: serde_json::from_str(&task_ids).unwrap_or_default(),
            order_ids: serde_json::from_str(&order_ids).unwrap_or_default(),
            task_positions: serde_json::from_str(&task_positions).unwrap_or_default(),
            order_positions: serde_json::from_str(&order_positions).unwrap_or_default(),
        }))
    }

    /// Upsert the user's pending confirmation, replacing any prior one.
    pub async fn save_confirmation(&self, pc: &PendingConfirmation) -> Result<(), QuipuError> {
        let updates = serde_json::to_string(&pc.pending_updates)?;

        sqlx::query(
            "INSERT INTO pending_confirmations \
             (user_id, kind, subject_id, pending_updates, original_text, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
               kind = excluded.kind, \
               subject_id = excluded.subject_id, \
               pending_updates = excluded.pending_updates, \
               original_text = excluded.original_text, \
               created_at = excluded.created_at, \
               expires_at = excluded.expires_at",
        )
        .bind(&pc.user_id)
        .bind(pc.kind.as_str())
        .bind(&pc.subject_id)
        .bind(updates)
        .bind(&pc.original_text)
        .bind(fmt_ts(pc.created_at))
        .bind(fmt_ts(pc.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("save confirmation failed: {e}")))?;

        Ok(())
    }

    /// Load the user's live confirmation. Expired rows read as absent.
    pub async fn load_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, QuipuError> {
        let row: Option<(String, String, String, String, String, String)> = sqlx::query_as(
            "SELECT kind, subject_id, pending_updates, original_text, created_at, expires_at \
             FROM pending_confirmations \
             WHERE user_id = ? AND datetime(expires_at) > datetime('now')",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("load confirmation failed: {e}")))?;

        let Some((kind, subject_id, updates, original_text, created_at, expires_at)) = row else {
            return Ok(None);
        };

        let Some(kind) = ConfirmationKind::parse(&kind) else {
            // Unrecognized kind from an older schema: treat as absent.
            return Ok(None);
        };

        Ok(Some(PendingConfirmation {
            user_id: user_id.to_string(),
            kind,
            subject_id,
            pending_updates: serde_json::from_str(&updates).unwrap_or(serde_json::Value::Null),
            original_text,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
            expires_at: parse_ts(&expires_at).unwrap_or_else(Utc::now),
        }))
    }

    /// Drop the user's pending confirmation, expired or not.
    pub async fn delete_confirmation(&self, user_id: &str) -> Result<(), QuipuError> {
        sqlx::query("DELETE FROM pending_confirmations WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("delete confirmation failed: {e}")))?;
        Ok(())
    }

    /// Upsert a pagination cursor for (user, entity kind).
    pub async fn save_cursor(&self, cursor: &PaginationCursor) -> Result<(), QuipuError> {
        let filters = serde_json::to_string(&cursor.filters)?;

        sqlx::query(
            "INSERT INTO pagination_cursors \
             (user_id, entity_kind, page_offset, total_count, filters, updated_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, datetime('now'), ?) \
             ON CONFLICT(user_id, entity_kind) DO UPDATE SET \
               page_offset = excluded.page_offset, \
               total_count = excluded.total_count, \
               filters = excluded.filters, \
               updated_at = datetime('now'), \
               expires_at = excluded.expires_at",
        )
        .bind(&cursor.user_id)
        .bind(cursor.entity_kind.as_str())
        .bind(cursor.page_offset)
        .bind(cursor.total_count)
        .bind(filters)
        .bind(fmt_ts(cursor.expires_at))
        .execute(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("save cursor failed: {e}")))?;

        Ok(())
    }

    /// Load the user's most recently touched live cursor. When both entity
    /// kinds have one, "next" continues whatever list the user saw last.
    pub async fn load_cursor(
        &self,
        user_id: &str,
    ) -> Result<Option<PaginationCursor>, QuipuError> {
        let row: Option<(String, i64, i64, String, String)> = sqlx::query_as(
            "SELECT entity_kind, page_offset, total_count, filters, expires_at \
             FROM pagination_cursors \
             WHERE user_id = ? AND datetime(expires_at) > datetime('now') \
             ORDER BY datetime(updated_at) DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("load cursor failed: {e}")))?;

        let Some((entity_kind, page_offset, total_count, filters, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(PaginationCursor {
            user_id: user_id.to_string(),
            entity_kind: EntityKind::parse(&entity_kind),
            page_offset,
            total_count,
            filters: serde_json::from_str(&filters).unwrap_or_default(),
            expires_at: parse_ts(&expires_at).unwrap_or_else(Utc::now),
        }))
    }

    /// Drop the cursor for (user, entity kind).
    pub async fn delete_cursor(
        &self,
        user_id: &str,
        entity_kind: EntityKind,
    ) -> Result<(), QuipuError> {
        sqlx::query("DELETE FROM pagination_cursors WHERE user_id = ? AND entity_kind = ?")
            .bind(user_id)
            .bind(entity_kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("delete cursor failed: {e}")))?;
        Ok(())
    }
}
