//! Order CRUD, filtered pagination, and the duplicate-pending probe.

use super::{fmt_ts, parse_ts, Store};
use chrono::{DateTime, Utc};
use quipu_core::entity::{EntityStatus, Order, OrderFilters, OrderPatch};
use quipu_core::error::QuipuError;
use uuid::Uuid;

/// Row shape shared by every order query.
type OrderRow = (
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    String,
);

fn row_to_order(row: OrderRow) -> Order {
    let (id, user_id, product, quantity, status, fulfill_at, created_at) = row;
    Order {
        id,
        user_id,
        product,
        quantity,
        status: EntityStatus::parse(&status).unwrap_or(EntityStatus::Pending),
        fulfill_at: fulfill_at.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    }
}

/// Short opaque order ID, e.g. "ORD-3F2A9C1B". Users type these back, so
/// 8 hex chars is as long as it gets.
fn new_order_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}

impl Store {
    /// Create an order and return it as stored.
    pub async fn create_order(
        &self,
        user_id: &str,
        product: &str,
        quantity: i64,
        fulfill_at: Option<DateTime<Utc>>,
    ) -> Result<Order, QuipuError> {
        let id = new_order_id();
        sqlx::query(
            "INSERT INTO orders (id, user_id, product, quantity, status, fulfill_at) \
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(product)
        .bind(quantity)
        .bind(fulfill_at.map(fmt_ts))
        .execute(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("create order failed: {e}")))?;

        self.get_order(user_id, &id)
            .await?
            .ok_or_else(|| QuipuError::Store(format!("order {id} vanished after insert")))
    }

    /// Fetch a single order scoped to its owner. ID match is case-insensitive
    /// since users retype them.
    pub async fn get_order(&self, user_id: &str, id: &str) -> Result<Option<Order>, QuipuError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, product, quantity, status, fulfill_at, created_at \
             FROM orders WHERE user_id = ? AND UPPER(id) = UPPER(?)",
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("get order failed: {e}")))?;

        Ok(row.map(row_to_order))
    }

    /// Fetch one page of the user's orders plus the total count, honoring
    /// the filter snapshot (status, fulfillment date range).
    pub async fn get_orders(
        &self,
        user_id: &str,
        filters: &OrderFilters,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Order>, i64), QuipuError> {
        let mut wheres = vec!["user_id = ?".to_string()];
        let mut values: Vec<String> = vec![user_id.to_string()];

        if let Some(status) = filters.status {
            wheres.push("status = ?".to_string());
            values.push(status.as_str().to_string());
        }
        if let Some(from) = filters.from {
            wheres.push("datetime(fulfill_at) >= datetime(?)".to_string());
            values.push(fmt_ts(from));
        }
        if let Some(to) = filters.to {
            wheres.push("datetime(fulfill_at) <= datetime(?)".to_string());
            values.push(fmt_ts(to));
        }

        let where_clause = wheres.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM orders WHERE {where_clause}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        for v in &values {
            count_query = count_query.bind(v);
        }
        let (total,) = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("count orders failed: {e}")))?;

        let page_sql = format!(
            "SELECT id, user_id, product, quantity, status, fulfill_at, created_at \
             FROM orders WHERE {where_clause} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query_as::<_, OrderRow>(&page_sql);
        for v in &values {
            page_query = page_query.bind(v);
        }
        page_query = page_query.bind(limit).bind(offset);

        let rows = page_query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("get orders failed: {e}")))?;

        Ok((rows.into_iter().map(row_to_order).collect(), total))
    }

    /// Apply a partial update. Returns `true` if a row was modified.
    pub async fn update_order(
        &self,
        user_id: &str,
        id: &str,
        patch: &OrderPatch,
    ) -> Result<bool, QuipuError> {
        let mut sets = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(ref p) = patch.product {
            sets.push("product = ?");
            values.push(p.clone());
        }
        if let Some(q) = patch.quantity {
            sets.push("quantity = ?");
            values.push(q.to_string());
        }
        if let Some(s) = patch.status {
            sets.push("status = ?");
            values.push(s.as_str().to_string());
        }
        if let Some(f) = patch.fulfill_at {
            sets.push("fulfill_at = ?");
            values.push(fmt_ts(f));
        }

        if sets.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE orders SET {} WHERE user_id = ? AND UPPER(id) = UPPER(?)",
            sets.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v);
        }
        query = query.bind(user_id);
        query = query.bind(id);

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("update order failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the status of several orders at once. Returns the number updated.
    pub async fn bulk_update_order_status(
        &self,
        user_id: &str,
        ids: &[String],
        status: EntityStatus,
    ) -> Result<u64, QuipuError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE orders SET status = ? WHERE user_id = ? AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(status.as_str()).bind(user_id);
        for id in ids {
            query = query.bind(id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("bulk order update failed: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Find a pending order that would make a new one a duplicate: same
    /// product (case-insensitive), same quantity, fulfillment timestamps
    /// within `window_secs` of each other. Two missing timestamps also count
    /// as "within the window".
    ///
    /// Retried sends and twice-forwarded product listings are a common
    /// source of accidental duplicates, so order creation probes this first.
    pub async fn find_duplicate_pending_order(
        &self,
        user_id: &str,
        product: &str,
        quantity: i64,
        fulfill_at: Option<DateTime<Utc>>,
        window_secs: i64,
    ) -> Result<Option<Order>, QuipuError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, user_id, product, quantity, status, fulfill_at, created_at \
             FROM orders \
             WHERE user_id = ? AND status = 'pending' \
             AND LOWER(product) = LOWER(?) AND quantity = ?",
        )
        .bind(user_id)
        .bind(product)
        .bind(quantity)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("duplicate probe failed: {e}")))?;

        let duplicate = rows.into_iter().map(row_to_order).find(|existing| {
            match (existing.fulfill_at, fulfill_at) {
                (Some(a), Some(b)) => (a - b).num_seconds().abs() <= window_secs,
                (None, None) => true,
                _ => false,
            }
        });

        Ok(duplicate)
    }
}
