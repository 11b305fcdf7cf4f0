pub mod address;
pub mod annotation;
pub mod connection;
pub mod migration;
pub mod task;
pub mod transaction;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Column encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Task {0} not found")]
    TaskNotFound(i64),

    #[error("Block {0} does not fit an INTEGER column")]
    BlockOutOfRange(u64),

    #[error("Task {task_id}: watermark cannot move from {current} back to {requested}")]
    WatermarkRegression {
        task_id: i64,
        current: u64,
        requested: u64,
    },
}

pub(crate) fn block_column(block: u64) -> Result<i64, StoreError> {
    i64::try_from(block).map_err(|_| StoreError::BlockOutOfRange(block))
}

// Id sets and id arrays live in TEXT columns as JSON arrays.
pub(crate) fn encode_ids<T: Serialize>(ids: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(ids)?)
}

pub(crate) fn decode_ids<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(raw)?)
}
