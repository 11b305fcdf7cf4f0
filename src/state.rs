use crate::config::Config;
use crate::registry::AddressRegistry;
use sqlx::SqlitePool;

pub struct AppState {
    pub config: Config,
    pub db_pool: SqlitePool,
    pub registry: AddressRegistry,
}
