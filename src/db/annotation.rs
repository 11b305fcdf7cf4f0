use crate::models::{Service, Tag};
use sqlx::{Row, SqliteConnection};

/// Get-or-create a tag by its unique title.
pub async fn resolve_tag(conn: &mut SqliteConnection, title: &str) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT INTO tag (title) VALUES (?) ON CONFLICT(title) DO NOTHING")
        .bind(title)
        .execute(&mut *conn)
        .await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM tag WHERE title = ?")
        .bind(title)
        .fetch_one(&mut *conn)
        .await
}

/// Get-or-create a service by its unique title.
pub async fn resolve_service(conn: &mut SqliteConnection, title: &str) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT INTO service (title) VALUES (?) ON CONFLICT(title) DO NOTHING")
        .bind(title)
        .execute(&mut *conn)
        .await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM service WHERE title = ?")
        .bind(title)
        .fetch_one(&mut *conn)
        .await
}

pub async fn list_tags(conn: &mut SqliteConnection) -> Result<Vec<Tag>, sqlx::Error> {
    let rows = sqlx::query("SELECT id, title FROM tag ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| -> Result<Tag, sqlx::Error> {
            Ok(Tag {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            })
        })
        .collect()
}

pub async fn list_services(conn: &mut SqliteConnection) -> Result<Vec<Service>, sqlx::Error> {
    let rows = sqlx::query("SELECT id, title FROM service ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| -> Result<Service, sqlx::Error> {
            Ok(Service {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            })
        })
        .collect()
}

pub async fn find_tag(conn: &mut SqliteConnection, tag_id: i64) -> Result<Option<Tag>, sqlx::Error> {
    let row = sqlx::query("SELECT id, title FROM tag WHERE id = ?")
        .bind(tag_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|row| -> Result<Tag, sqlx::Error> {
        Ok(Tag {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
        })
    })
    .transpose()
}

pub async fn find_service(
    conn: &mut SqliteConnection,
    service_id: i64,
) -> Result<Option<Service>, sqlx::Error> {
    let row = sqlx::query("SELECT id, title FROM service WHERE id = ?")
        .bind(service_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|row| -> Result<Service, sqlx::Error> {
        Ok(Service {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
        })
    })
    .transpose()
}
