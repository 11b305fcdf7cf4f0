// Typed records for every persisted entity plus the chain definitions loaded
// from configuration.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;

pub type AddressId = i64;
pub type TagId = i64;
pub type ServiceId = i64;
pub type TaskId = i64;

/// Placeholder bound to the task watermark when a page URL is built.
pub const START_PLACEHOLDER: &str = "{start}";

pub(crate) fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn serialize_amount<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&amount.to_string())
}

/// A chain and the explorer query templates used to crawl it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    /// URL templates with `{address}`, `{token}` and `{start}` placeholders.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl Chain {
    /// Binds address and token into every template, keeping `{start}` for the crawler.
    pub fn task_queries(&self, address_hex: &str) -> Vec<String> {
        self.addresses
            .iter()
            .map(|template| {
                template
                    .replace("{address}", address_hex)
                    .replace("{token}", &self.api_key)
            })
            .collect()
    }
}

/// Public view of a configured chain; the API key stays private.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    pub id: i64,
    pub name: String,
    pub queries: usize,
}

impl From<&Chain> for ChainSummary {
    fn from(chain: &Chain) -> Self {
        Self {
            id: chain.id,
            name: chain.name.clone(),
            queries: chain.addresses.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub id: AddressId,
    pub chain: i64,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: Vec<u8>,
    pub title: Option<String>,
    pub tags: BTreeSet<TagId>,
    pub services: BTreeSet<ServiceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: TagId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub id: ServiceId,
    pub title: String,
}

/// A crawl task: one tracked address on one chain with its resumable cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(serialize_with = "serialize_hex")]
    pub address: Vec<u8>,
    pub chain: i64,
    pub last_block: u64,
    pub tags: BTreeSet<TagId>,
    pub services: BTreeSet<ServiceId>,
    pub query: String,
    pub enabled: bool,
}

impl Task {
    /// URL of the page starting at the current watermark.
    pub fn page_url(&self) -> String {
        self.query
            .replace(START_PLACEHOLDER, &self.last_block.to_string())
    }
}

/// Everything needed to enqueue a task; the store assigns id and cursor.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub address: Vec<u8>,
    pub chain: i64,
    pub tags: BTreeSet<TagId>,
    pub services: BTreeSet<ServiceId>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub chain: i64,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: Vec<u8>,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: u128,
    pub from: Vec<AddressId>,
    pub to: Vec<AddressId>,
    pub block_number: u64,
}
