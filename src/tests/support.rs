//! Shared fixtures: in-memory registry and a scripted history source.

use crate::{
    cache,
    crawler::{
        client::{FetchError, PageSource},
        models::{HistoryPage, HistoryResponse},
    },
    db::{connection, task},
    models::{NewTask, Task},
    registry::AddressRegistry,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CHAIN: i64 = 1;

pub async fn setup() -> AddressRegistry {
    let pool = connection::in_memory()
        .await
        .expect("Failed to open in-memory database");
    AddressRegistry::new(pool, cache::build_cache(10_000, Duration::from_secs(60)))
}

pub async fn create_task(registry: &AddressRegistry, address: &[u8], query: &str) -> Task {
    create_annotated_task(registry, address, query, BTreeSet::new(), BTreeSet::new()).await
}

pub async fn create_annotated_task(
    registry: &AddressRegistry,
    address: &[u8],
    query: &str,
    tags: BTreeSet<i64>,
    services: BTreeSet<i64>,
) -> Task {
    let id = task::create_task(
        registry.pool(),
        &NewTask {
            address: address.to_vec(),
            chain: CHAIN,
            tags,
            services,
            query: query.to_string(),
        },
    )
    .await
    .unwrap();

    task::get_task(registry.pool(), id).await.unwrap()
}

/// Explorer-style record.
pub fn record(from: &str, to: &str, hash: &str, value: &str, block: &str) -> Value {
    serde_json::json!({
        "from": from,
        "to": to,
        "hash": hash,
        "value": value,
        "blockNumber": block,
    })
}

pub fn page(records: Vec<Value>) -> Value {
    serde_json::json!({ "status": "1", "message": "OK", "result": records })
}

/// Replays canned responses in order and remembers every requested URL.
/// Once the script runs out it answers with an empty result.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Result<HistoryPage, FetchError>>>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new(bodies: Vec<Value>) -> Self {
        let source = Self::default();
        for body in bodies {
            source.push_body(body);
        }
        source
    }

    pub fn push_body(&self, body: Value) {
        let response: HistoryResponse = serde_json::from_value(body).unwrap();
        self.responses.lock().unwrap().push_back(response.into_page());
    }

    pub fn push_error(&self, error: FetchError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, url: &str) -> Result<HistoryPage, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(HistoryPage {
                    records: Some(Vec::new()),
                })
            })
    }
}
