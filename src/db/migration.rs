use sqlx::SqlitePool;
use tracing::info;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tag (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS service (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS address (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chain INTEGER NOT NULL,
        hash BLOB NOT NULL,
        title TEXT,
        UNIQUE (chain, hash)
    )",
    "CREATE TABLE IF NOT EXISTS address_tag (
        address_id INTEGER NOT NULL REFERENCES address(id),
        tag_id INTEGER NOT NULL REFERENCES tag(id),
        PRIMARY KEY (address_id, tag_id)
    )",
    "CREATE TABLE IF NOT EXISTS address_service (
        address_id INTEGER NOT NULL REFERENCES address(id),
        service_id INTEGER NOT NULL REFERENCES service(id),
        PRIMARY KEY (address_id, service_id)
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        address BLOB NOT NULL,
        chain INTEGER NOT NULL,
        last_block INTEGER NOT NULL DEFAULT 0,
        tags TEXT NOT NULL DEFAULT '[]',
        services TEXT NOT NULL DEFAULT '[]',
        query TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT 1,
        updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chain INTEGER NOT NULL,
        hash BLOB NOT NULL,
        amount TEXT NOT NULL,
        from_ids TEXT NOT NULL DEFAULT '[]',
        to_ids TEXT NOT NULL DEFAULT '[]',
        block_number INTEGER NOT NULL,
        UNIQUE (chain, hash)
    )",
    "CREATE INDEX IF NOT EXISTS idx_address_hash ON address(hash)",
    "CREATE INDEX IF NOT EXISTS idx_address_tag_tag ON address_tag(tag_id)",
    "CREATE INDEX IF NOT EXISTS idx_address_service_service ON address_service(service_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_enabled ON tasks(enabled, id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(chain, block_number)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Database migrations completed successfully");
    Ok(())
}
