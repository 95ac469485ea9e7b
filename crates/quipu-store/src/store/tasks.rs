//! Task CRUD, paginated fetch, and bulk status updates.

use super::{fmt_ts, parse_ts, Store};
use chrono::{DateTime, Utc};
use quipu_core::entity::{EntityStatus, Task, TaskPatch};
use quipu_core::error::QuipuError;

/// Row shape shared by every task query.
type TaskRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
);

fn row_to_task(row: TaskRow) -> Task {
    let (id, user_id, title, description, status, due_at, created_at) = row;
    Task {
        id,
        user_id,
        title,
        description,
        status: EntityStatus::parse(&status).unwrap_or(EntityStatus::Pending),
        due_at: due_at.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    }
}

impl Store {
    /// Create a task and return it as stored.
    pub async fn create_task(
        &self,
        user_id: &str,
        title: &str,
        description: Option<&str>,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<Task, QuipuError> {
        let result = sqlx::query(
            "INSERT INTO tasks (user_id, title, description, status, due_at) \
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(due_at.map(fmt_ts))
        .execute(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("create task failed: {e}")))?;

        let id = result.last_insert_rowid();
        self.get_task(user_id, id)
            .await?
            .ok_or_else(|| QuipuError::Store(format!("task {id} vanished after insert")))
    }

    /// Fetch a single task scoped to its owner.
    pub async fn get_task(&self, user_id: &str, id: i64) -> Result<Option<Task>, QuipuError> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, user_id, title, description, status, due_at, created_at \
             FROM tasks WHERE user_id = ? AND id = ?",
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("get task failed: {e}")))?;

        Ok(row.map(row_to_task))
    }

    /// Fetch one page of the user's tasks plus the total count.
    ///
    /// Newest first; the ordering must be stable across pages so pagination
    /// cursors see a consistent sequence.
    pub async fn get_tasks(
        &self,
        user_id: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Task>, i64), QuipuError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("count tasks failed: {e}")))?;

        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, user_id, title, description, status, due_at, created_at \
             FROM tasks WHERE user_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("get tasks failed: {e}")))?;

        Ok((rows.into_iter().map(row_to_task).collect(), total))
    }

    /// Every task the user has, for fuzzy matching.
    pub async fn all_tasks(&self, user_id: &str) -> Result<Vec<Task>, QuipuError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, user_id, title, description, status, due_at, created_at \
             FROM tasks WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QuipuError::Store(format!("all tasks failed: {e}")))?;

        Ok(rows.into_iter().map(row_to_task).collect())
    }

    /// Apply a partial update. Returns `true` if a row was modified.
    pub async fn update_task(
        &self,
        user_id: &str,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<bool, QuipuError> {
        let mut sets = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(ref t) = patch.title {
            sets.push("title = ?");
            values.push(t.clone());
        }
        if let Some(ref d) = patch.description {
            sets.push("description = ?");
            values.push(d.clone());
        }
        if let Some(s) = patch.status {
            sets.push("status = ?");
            values.push(s.as_str().to_string());
        }
        if let Some(due) = patch.due_at {
            sets.push("due_at = ?");
            values.push(fmt_ts(due));
        }

        if sets.is_empty() {
            return Ok(false);
        }

        let sql = format!(
            "UPDATE tasks SET {} WHERE user_id = ? AND id = ?",
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
            .map_err(|e| QuipuError::Store(format!("update task failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the status of several tasks at once. Returns the number updated.
    pub async fn bulk_update_task_status(
        &self,
        user_id: &str,
        ids: &[i64],
        status: EntityStatus,
    ) -> Result<u64, QuipuError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE tasks SET status = ? WHERE user_id = ? AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(status.as_str()).bind(user_id);
        for id in ids {
            query = query.bind(id);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| QuipuError::Store(format!("bulk task update failed: {e}")))?;

        Ok(result.rows_affected())
    }
}
