// Address rows and their tag/service annotations.
//
// Every write here is conflict tolerant: inserts use ON CONFLICT DO NOTHING
// and are followed by a lookup, so concurrent or repeated calls converge on
// the same row instead of failing.

use crate::models::{Address, AddressId, ServiceId, TagId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeSet;

/// Inserts `(chain, hash)` unless present. Returns whether a row was created.
pub async fn insert_address(
    conn: &mut SqliteConnection,
    chain: i64,
    hash: &[u8],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO address (chain, hash) VALUES (?, ?)
         ON CONFLICT(chain, hash) DO NOTHING",
    )
    .bind(chain)
    .bind(hash)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn find_address_id(
    conn: &mut SqliteConnection,
    chain: i64,
    hash: &[u8],
) -> Result<Option<AddressId>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM address WHERE chain = ? AND hash = ?")
        .bind(chain)
        .bind(hash)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn upsert_address(
    conn: &mut SqliteConnection,
    chain: i64,
    hash: &[u8],
) -> Result<AddressId, sqlx::Error> {
    insert_address(conn, chain, hash).await?;
    find_address_id(conn, chain, hash)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn add_tags(
    conn: &mut SqliteConnection,
    address_id: AddressId,
    tags: &BTreeSet<TagId>,
) -> Result<(), sqlx::Error> {
    for tag_id in tags {
        sqlx::query(
            "INSERT INTO address_tag (address_id, tag_id) VALUES (?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(address_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn add_services(
    conn: &mut SqliteConnection,
    address_id: AddressId,
    services: &BTreeSet<ServiceId>,
) -> Result<(), sqlx::Error> {
    for service_id in services {
        sqlx::query(
            "INSERT INTO address_service (address_id, service_id) VALUES (?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(address_id)
        .bind(service_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn find_address(
    conn: &mut SqliteConnection,
    chain: i64,
    hash: &[u8],
) -> Result<Option<Address>, sqlx::Error> {
    let row = sqlx::query("SELECT id, chain, hash, title FROM address WHERE chain = ? AND hash = ?")
        .bind(chain)
        .bind(hash)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, &row).await?)),
        None => Ok(None),
    }
}

pub async fn find_address_by_id(
    conn: &mut SqliteConnection,
    address_id: AddressId,
) -> Result<Option<Address>, sqlx::Error> {
    let row = sqlx::query("SELECT id, chain, hash, title FROM address WHERE id = ?")
        .bind(address_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, &row).await?)),
        None => Ok(None),
    }
}

/// Rows for a set of ids; unknown ids are left out.
pub async fn addresses_by_ids(
    conn: &mut SqliteConnection,
    ids: &BTreeSet<AddressId>,
) -> Result<Vec<Address>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = serde_json::to_string(ids).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let rows = sqlx::query(
        "SELECT id, chain, hash, title FROM address
         WHERE id IN (SELECT value FROM json_each(?))
         ORDER BY id",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    hydrate_all(conn, &rows).await
}

/// Same hash on every chain it has been seen on.
pub async fn addresses_by_hash(
    conn: &mut SqliteConnection,
    hash: &[u8],
) -> Result<Vec<Address>, sqlx::Error> {
    let rows = sqlx::query("SELECT id, chain, hash, title FROM address WHERE hash = ? ORDER BY chain")
        .bind(hash)
        .fetch_all(&mut *conn)
        .await?;

    hydrate_all(conn, &rows).await
}

pub async fn addresses_by_tag(
    conn: &mut SqliteConnection,
    tag_id: TagId,
) -> Result<Vec<Address>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT A.id, A.chain, A.hash, A.title
         FROM address A JOIN address_tag T ON T.address_id = A.id
         WHERE T.tag_id = ?
         ORDER BY A.id",
    )
    .bind(tag_id)
    .fetch_all(&mut *conn)
    .await?;

    hydrate_all(conn, &rows).await
}

pub async fn addresses_by_service(
    conn: &mut SqliteConnection,
    service_id: ServiceId,
) -> Result<Vec<Address>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT A.id, A.chain, A.hash, A.title
         FROM address A JOIN address_service S ON S.address_id = A.id
         WHERE S.service_id = ?
         ORDER BY A.id",
    )
    .bind(service_id)
    .fetch_all(&mut *conn)
    .await?;

    hydrate_all(conn, &rows).await
}

pub async fn count_addresses(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM address")
        .fetch_one(&mut *conn)
        .await
}

async fn hydrate_all(
    conn: &mut SqliteConnection,
    rows: &[SqliteRow],
) -> Result<Vec<Address>, sqlx::Error> {
    let mut addresses = Vec::with_capacity(rows.len());
    for row in rows {
        addresses.push(hydrate(conn, row).await?);
    }
    Ok(addresses)
}

async fn hydrate(conn: &mut SqliteConnection, row: &SqliteRow) -> Result<Address, sqlx::Error> {
    let id: i64 = row.try_get("id")?;

    let tags = sqlx::query_scalar::<_, i64>("SELECT tag_id FROM address_tag WHERE address_id = ?")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    let services =
        sqlx::query_scalar::<_, i64>("SELECT service_id FROM address_service WHERE address_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Address {
        id,
        chain: row.try_get("chain")?,
        hash: row.try_get("hash")?,
        title: row.try_get("title")?,
        tags: tags.into_iter().collect(),
        services: services.into_iter().collect(),
    })
}
