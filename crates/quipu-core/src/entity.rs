//! Domain entities: tasks, orders, and their partial-update payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by tasks and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl EntityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Pending => "pending",
            EntityStatus::Processing => "processing",
            EntityStatus::Completed => "completed",
            EntityStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(EntityStatus::Pending),
            "processing" => Some(EntityStatus::Processing),
            "completed" | "complete" | "done" => Some(EntityStatus::Completed),
            "cancelled" | "canceled" | "cancel" => Some(EntityStatus::Cancelled),
            _ => None,
        }
    }

    /// Scan a short free-text reply for a bare status keyword.
    ///
    /// Short replies like "done" rarely survive intent classification, so
    /// the reply stage falls back to this. Matches whole words only —
    /// "I'm done with 2 and 3" hits, "pendingly" does not.
    pub fn from_keyword(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let has = |word: &str| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| w == word)
        };
        if has("done") || has("complete") || has("completed") {
            Some(EntityStatus::Completed)
        } else if has("processing") {
            Some(EntityStatus::Processing)
        } else if has("cancelled") || has("canceled") || has("cancel") {
            Some(EntityStatus::Cancelled)
        } else if has("pending") {
            Some(EntityStatus::Pending)
        } else {
            None
        }
    }
}

/// A user task (or reminder — the classifier may call it either).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: EntityStatus,
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A customer order. IDs are opaque strings ("ORD-3F2A9C1B") shown to the
/// user verbatim, unlike task IDs which stay internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub product: String,
    pub quantity: i64,
    pub status: EntityStatus,
    pub fulfill_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Partial update for a task. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.due_at.is_none()
    }
}

/// Partial update for an order.
///
/// `fulfill_raw` keeps the user's original fulfillment-date phrase. When a
/// parked duplicate-order decision is resolved with "new", the date is
/// re-parsed from this string so both paths run the same parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfill_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfill_raw: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.product.is_none()
            && self.quantity.is_none()
            && self.status.is_none()
            && self.fulfill_at.is_none()
    }
}

/// Filter snapshot for order list queries, persisted inside a pagination
/// cursor so every page of one listing sees the same filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_keyword_fallback() {
        assert_eq!(
            EntityStatus::from_keyword("done"),
            Some(EntityStatus::Completed)
        );
        assert_eq!(
            EntityStatus::from_keyword("mark 1 and 3 as done"),
            Some(EntityStatus::Completed)
        );
        assert_eq!(
            EntityStatus::from_keyword("cancel that"),
            Some(EntityStatus::Cancelled)
        );
        assert_eq!(
            EntityStatus::from_keyword("it's processing"),
            Some(EntityStatus::Processing)
        );
        assert_eq!(EntityStatus::from_keyword("pendingly"), None);
        assert_eq!(EntityStatus::from_keyword("hello there"), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            EntityStatus::Pending,
            EntityStatus::Processing,
            EntityStatus::Completed,
            EntityStatus::Cancelled,
        ] {
            assert_eq!(EntityStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(EntityStatus::parse("shipped"), None);
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(TaskPatch::default().is_empty());
        let p = TaskPatch {
            status: Some(EntityStatus::Completed),
            ..Default::default()
        };
        assert!(!p.is_empty());
    }

    #[test]
    fn test_order_patch_serde_keeps_raw_date() {
        let p = OrderPatch {
            product: Some("beans".into()),
            quantity: Some(3),
            fulfill_raw: Some("tomorrow 5pm".into()),
            ..Default::default()
        };
        let v = serde_json::to_value(&p).unwrap();
        let back: OrderPatch = serde_json::from_value(v).unwrap();
        assert_eq!(back.fulfill_raw.as_deref(), Some("tomorrow 5pm"));
        assert_eq!(back.quantity, Some(3));
    }
}
