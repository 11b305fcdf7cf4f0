//! Counterparty analysis of one address over its recorded transactions.
//!
//! For every transaction touching the address:
//! - `inputs`: senders of transactions the address received
//! - `outputs`: recipients of transactions the address sent
//! - `mixed_in`: co-senders of transactions the address sent
//! - `mixed_out`: co-recipients of transactions the address received
//!
//! The analysed address itself is never listed as its own counterparty.

use crate::db::{transaction, StoreError};
use crate::models::{serialize_hex, Address, AddressId, ServiceId, TagId};
use crate::registry::AddressRegistry;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Occurrence counts per counterparty id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelationCounts {
    pub inputs: BTreeMap<AddressId, u32>,
    pub outputs: BTreeMap<AddressId, u32>,
    pub mixed_in: BTreeMap<AddressId, u32>,
    pub mixed_out: BTreeMap<AddressId, u32>,
}

impl RelationCounts {
    pub fn collect<'a, I>(address_id: AddressId, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a (Vec<AddressId>, Vec<AddressId>)>,
    {
        let mut counts = Self::default();

        for (from, to) in rows {
            let sent = from.contains(&address_id);
            let received = to.contains(&address_id);

            for &peer in from.iter().filter(|&&id| id != address_id) {
                if received {
                    *counts.inputs.entry(peer).or_default() += 1;
                }
                if sent {
                    *counts.mixed_in.entry(peer).or_default() += 1;
                }
            }
            for &peer in to.iter().filter(|&&id| id != address_id) {
                if sent {
                    *counts.outputs.entry(peer).or_default() += 1;
                }
                if received {
                    *counts.mixed_out.entry(peer).or_default() += 1;
                }
            }
        }

        counts
    }

    /// Every counterparty id across the four relations.
    pub fn peers(&self) -> BTreeSet<AddressId> {
        [&self.inputs, &self.outputs, &self.mixed_in, &self.mixed_out]
            .into_iter()
            .flat_map(|relation| relation.keys().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterparty {
    pub id: AddressId,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: Vec<u8>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub services: Vec<String>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRelation {
    pub id: AddressId,
    pub chain: i64,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: Vec<u8>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub services: Vec<String>,
    pub inputs: Vec<Counterparty>,
    pub outputs: Vec<Counterparty>,
    pub mixed_in: Vec<Counterparty>,
    pub mixed_out: Vec<Counterparty>,
}

// Annotation ids rendered as titles; ids without a row fall back to the number
struct Titles {
    tags: BTreeMap<TagId, String>,
    services: BTreeMap<ServiceId, String>,
}

impl Titles {
    fn tags(&self, ids: &BTreeSet<TagId>) -> Vec<String> {
        ids.iter()
            .map(|id| self.tags.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect()
    }

    fn services(&self, ids: &BTreeSet<ServiceId>) -> Vec<String> {
        ids.iter()
            .map(|id| self.services.get(id).cloned().unwrap_or_else(|| id.to_string()))
            .collect()
    }
}

/// Relations of `(chain, hash)`, or `None` when the address is not registered.
pub async fn relation(
    registry: &AddressRegistry,
    chain: i64,
    hash: &[u8],
) -> Result<Option<AddressRelation>, StoreError> {
    let Some(address) = registry.find_address(chain, hash).await? else {
        return Ok(None);
    };

    let rows = transaction::counterparty_rows(registry.pool(), chain, address.id).await?;
    let counts = RelationCounts::collect(address.id, &rows);
    debug!(
        "Address {} has {} transactions and {} counterparties",
        address.id,
        rows.len(),
        counts.peers().len()
    );

    let peers: BTreeMap<AddressId, Address> = registry
        .addresses_by_ids(&counts.peers())
        .await?
        .into_iter()
        .map(|peer| (peer.id, peer))
        .collect();
    let titles = Titles {
        tags: registry
            .list_tags()
            .await?
            .into_iter()
            .map(|tag| (tag.id, tag.title))
            .collect(),
        services: registry
            .list_services()
            .await?
            .into_iter()
            .map(|service| (service.id, service.title))
            .collect(),
    };

    let describe = |relation: &BTreeMap<AddressId, u32>| -> Vec<Counterparty> {
        let mut listed: Vec<Counterparty> = relation
            .iter()
            .filter_map(|(id, &count)| {
                peers.get(id).map(|peer| Counterparty {
                    id: peer.id,
                    hash: peer.hash.clone(),
                    title: peer.title.clone(),
                    tags: titles.tags(&peer.tags),
                    services: titles.services(&peer.services),
                    count,
                })
            })
            .collect();
        listed.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
        listed
    };

    Ok(Some(AddressRelation {
        id: address.id,
        chain: address.chain,
        tags: titles.tags(&address.tags),
        services: titles.services(&address.services),
        inputs: describe(&counts.inputs),
        outputs: describe(&counts.outputs),
        mixed_in: describe(&counts.mixed_in),
        mixed_out: describe(&counts.mixed_out),
        hash: address.hash,
        title: address.title,
    }))
}
