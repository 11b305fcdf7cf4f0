// Task store: durable crawl queue with a monotonic per-task watermark.

use super::{block_column, decode_ids, encode_ids, StoreError};
use crate::models::{NewTask, Task, TaskId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const TASK_COLUMNS: &str = "id, address, chain, last_block, tags, services, query, enabled";

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let tags: String = row.try_get("tags")?;
    let services: String = row.try_get("services")?;

    Ok(Task {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        chain: row.try_get("chain")?,
        last_block: row.try_get::<i64, _>("last_block")? as u64,
        tags: decode_ids(&tags)?,
        services: decode_ids(&services)?,
        query: row.try_get("query")?,
        enabled: row.try_get("enabled")?,
    })
}

pub async fn create_task(pool: &SqlitePool, task: &NewTask) -> Result<TaskId, StoreError> {
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        "INSERT INTO tasks (address, chain, last_block, tags, services, query, enabled, updated_at)
         VALUES (?, ?, 0, ?, ?, ?, 1, ?)",
    )
    .bind(&task.address)
    .bind(task.chain)
    .bind(encode_ids(&task.tags)?)
    .bind(encode_ids(&task.services)?)
    .bind(&task.query)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get_task(pool: &SqlitePool, task_id: TaskId) -> Result<Task, StoreError> {
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::TaskNotFound(task_id))?;

    task_from_row(&row)
}

/// Enabled tasks, oldest first.
pub async fn list_enabled(pool: &SqlitePool) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE enabled = 1 ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(task_from_row).collect()
}

pub async fn list_tasks(pool: &SqlitePool) -> Result<Vec<Task>, StoreError> {
    let rows = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id ASC"))
        .fetch_all(pool)
        .await?;

    rows.iter().map(task_from_row).collect()
}

/// Moves the watermark forward. Equal values are accepted, lower ones are not.
pub async fn advance(
    pool: &SqlitePool,
    task_id: TaskId,
    new_last_block: u64,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();
    let requested = block_column(new_last_block)?;

    let result = sqlx::query(
        "UPDATE tasks SET last_block = ?, updated_at = ?
         WHERE id = ? AND last_block <= ?",
    )
    .bind(requested)
    .bind(now)
    .bind(task_id)
    .bind(requested)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let current = get_task(pool, task_id).await?.last_block;
    Err(StoreError::WatermarkRegression {
        task_id,
        current,
        requested: new_last_block,
    })
}

/// Marks the task done and records its final watermark in one statement.
pub async fn disable(
    pool: &SqlitePool,
    task_id: TaskId,
    final_last_block: u64,
) -> Result<(), StoreError> {
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        "UPDATE tasks SET enabled = 0, last_block = MAX(last_block, ?), updated_at = ?
         WHERE id = ?",
    )
    .bind(block_column(final_last_block)?)
    .bind(now)
    .bind(task_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::TaskNotFound(task_id));
    }
    Ok(())
}
