//! Address registry: the deduplicated `(chain, hash)` store and its tag and
//! service dictionaries.
//!
//! Ids are cached in-process. The core never deletes addresses, tags or
//! services, so a cached id stays valid for the life of the database.

use crate::cache::{CacheKey, IdCache};
use crate::db::{address, annotation};
use crate::models::{Address, AddressId, Service, ServiceId, Tag, TagId};
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Clone)]
pub struct AddressRegistry {
    pool: SqlitePool,
    cache: IdCache,
}

impl AddressRegistry {
    pub fn new(pool: SqlitePool, cache: IdCache) -> Self {
        Self { pool, cache }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the id of `(chain, hash)`, creating the row if needed.
    pub async fn upsert_address(&self, chain: i64, hash: &[u8]) -> Result<AddressId, sqlx::Error> {
        let key = CacheKey::address(chain, hash);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(id);
        }

        debug!("Id cache miss for {}", key);
        let mut conn = self.pool.acquire().await?;
        let id = address::upsert_address(&mut conn, chain, hash).await?;
        self.cache.insert(key, id).await;
        Ok(id)
    }

    /// Registers a batch of hashes in one unit of work. Returns how many rows
    /// were newly created.
    pub async fn upsert_addresses(
        &self,
        chain: i64,
        hashes: &BTreeSet<Vec<u8>>,
    ) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0;

        for hash in hashes {
            if self.cache.contains_key(&CacheKey::address(chain, hash)) {
                continue;
            }
            if address::insert_address(&mut tx, chain, hash).await? {
                created += 1;
            }
        }

        tx.commit().await?;
        debug!("Registered {} new of {} addresses on chain {}", created, hashes.len(), chain);
        Ok(created)
    }

    /// Ids matching `(chain, hash)`: one element when registered, none otherwise.
    pub async fn resolve_address_ids(
        &self,
        chain: i64,
        hash: &[u8],
    ) -> Result<Vec<AddressId>, sqlx::Error> {
        let key = CacheKey::address(chain, hash);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(vec![id]);
        }

        let mut conn = self.pool.acquire().await?;
        match address::find_address_id(&mut conn, chain, hash).await? {
            Some(id) => {
                self.cache.insert(key, id).await;
                Ok(vec![id])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Set-unions `tags` and `services` into the address, creating it if absent.
    pub async fn merge_annotations(
        &self,
        chain: i64,
        hash: &[u8],
        tags: &BTreeSet<TagId>,
        services: &BTreeSet<ServiceId>,
    ) -> Result<AddressId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let id = address::upsert_address(&mut tx, chain, hash).await?;
        address::add_tags(&mut tx, id, tags).await?;
        address::add_services(&mut tx, id, services).await?;
        tx.commit().await?;

        self.cache.insert(CacheKey::address(chain, hash), id).await;
        Ok(id)
    }

    pub async fn resolve_tag(&self, title: &str) -> Result<TagId, sqlx::Error> {
        let key = CacheKey::tag(title);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(id);
        }

        debug!("Id cache miss for {}", key);
        let mut conn = self.pool.acquire().await?;
        let id = annotation::resolve_tag(&mut conn, title).await?;
        self.cache.insert(key, id).await;
        Ok(id)
    }

    pub async fn resolve_service(&self, title: &str) -> Result<ServiceId, sqlx::Error> {
        let key = CacheKey::service(title);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(id);
        }

        debug!("Id cache miss for {}", key);
        let mut conn = self.pool.acquire().await?;
        let id = annotation::resolve_service(&mut conn, title).await?;
        self.cache.insert(key, id).await;
        Ok(id)
    }

    pub async fn find_address(&self, chain: i64, hash: &[u8]) -> Result<Option<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::find_address(&mut conn, chain, hash).await
    }

    pub async fn find_address_by_id(&self, address_id: AddressId) -> Result<Option<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::find_address_by_id(&mut conn, address_id).await
    }

    pub async fn addresses_by_ids(
        &self,
        ids: &BTreeSet<AddressId>,
    ) -> Result<Vec<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::addresses_by_ids(&mut conn, ids).await
    }

    pub async fn addresses_by_hash(&self, hash: &[u8]) -> Result<Vec<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::addresses_by_hash(&mut conn, hash).await
    }

    pub async fn addresses_by_tag(&self, tag_id: TagId) -> Result<Vec<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::addresses_by_tag(&mut conn, tag_id).await
    }

    pub async fn addresses_by_service(
        &self,
        service_id: ServiceId,
    ) -> Result<Vec<Address>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::addresses_by_service(&mut conn, service_id).await
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        annotation::list_tags(&mut conn).await
    }

    pub async fn find_tag(&self, tag_id: TagId) -> Result<Option<Tag>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        annotation::find_tag(&mut conn, tag_id).await
    }

    pub async fn find_service(&self, service_id: ServiceId) -> Result<Option<Service>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        annotation::find_service(&mut conn, service_id).await
    }

    pub async fn list_services(&self) -> Result<Vec<Service>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        annotation::list_services(&mut conn).await
    }

    pub async fn count_addresses(&self) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        address::count_addresses(&mut conn).await
    }
}
