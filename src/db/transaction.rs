use super::{block_column, decode_ids, encode_ids, StoreError};
use crate::models::{AddressId, Transaction};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// `(chain, hash)` was already recorded; nothing changed.
    Duplicate,
}

pub async fn add_transaction(
    pool: &SqlitePool,
    transaction: &Transaction,
) -> Result<InsertOutcome, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO transactions (chain, hash, amount, from_ids, to_ids, block_number)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(chain, hash) DO NOTHING
        "#,
    )
    .bind(transaction.chain)
    .bind(&transaction.hash)
    .bind(transaction.amount.to_string())
    .bind(encode_ids(&transaction.from)?)
    .bind(encode_ids(&transaction.to)?)
    .bind(block_column(transaction.block_number)?)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        Ok(InsertOutcome::Inserted)
    } else {
        Ok(InsertOutcome::Duplicate)
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let amount: String = row.try_get("amount")?;
    let from: String = row.try_get("from_ids")?;
    let to: String = row.try_get("to_ids")?;

    Ok(Transaction {
        chain: row.try_get("chain")?,
        hash: row.try_get("hash")?,
        amount: amount.parse().map_err(|_| {
            sqlx::Error::Decode(format!("invalid stored amount: {amount}").into())
        })?,
        from: decode_ids(&from)?,
        to: decode_ids(&to)?,
        block_number: row.try_get::<i64, _>("block_number")? as u64,
    })
}

pub async fn get_transaction(
    pool: &SqlitePool,
    chain: i64,
    hash: &[u8],
) -> Result<Option<Transaction>, StoreError> {
    let row = sqlx::query(
        "SELECT chain, hash, amount, from_ids, to_ids, block_number
         FROM transactions WHERE chain = ? AND hash = ?",
    )
    .bind(chain)
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(transaction_from_row).transpose()
}

// from_ids/to_ids are JSON arrays, json_each unpacks them for the match
const TOUCHES_ADDRESS: &str = r#"
    FROM transactions T
    WHERE T.chain = ?
      AND (EXISTS (SELECT 1 FROM json_each(T.from_ids) WHERE value = ?)
        OR EXISTS (SELECT 1 FROM json_each(T.to_ids) WHERE value = ?))
"#;

/// Transactions on `chain` where the address appears on either side.
pub async fn transactions_for_address(
    pool: &SqlitePool,
    chain: i64,
    address_id: AddressId,
    offset: i64,
    limit: i64,
) -> Result<(Vec<Transaction>, i64), StoreError> {
    let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) {TOUCHES_ADDRESS}"))
        .bind(chain)
        .bind(address_id)
        .bind(address_id)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query(&format!(
        "SELECT T.chain, T.hash, T.amount, T.from_ids, T.to_ids, T.block_number {TOUCHES_ADDRESS}
         ORDER BY T.block_number ASC, T.id ASC
         LIMIT ? OFFSET ?"
    ))
    .bind(chain)
    .bind(address_id)
    .bind(address_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let transactions = rows
        .iter()
        .map(transaction_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok((transactions, total))
}

/// Sender and recipient id arrays of every transaction touching the address.
pub async fn counterparty_rows(
    pool: &SqlitePool,
    chain: i64,
    address_id: AddressId,
) -> Result<Vec<(Vec<AddressId>, Vec<AddressId>)>, StoreError> {
    let rows = sqlx::query(&format!("SELECT T.from_ids, T.to_ids {TOUCHES_ADDRESS}"))
        .bind(chain)
        .bind(address_id)
        .bind(address_id)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<(Vec<AddressId>, Vec<AddressId>), StoreError> {
            let from: String = row.try_get("from_ids")?;
            let to: String = row.try_get("to_ids")?;
            Ok((decode_ids(&from)?, decode_ids(&to)?))
        })
        .collect()
}

pub async fn count_transactions(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
