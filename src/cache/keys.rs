//! Cache key generation for registry id lookups

use std::fmt;

/// Identifies a row whose id never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Address row keyed by its unique `(chain, hash)` pair
    Address { chain: i64, hash: Vec<u8> },
    /// Tag row keyed by its unique title
    Tag(String),
    /// Service row keyed by its unique title
    Service(String),
}

impl CacheKey {
    pub fn address(chain: i64, hash: &[u8]) -> Self {
        Self::Address {
            chain,
            hash: hash.to_vec(),
        }
    }

    pub fn tag(title: &str) -> Self {
        Self::Tag(title.to_string())
    }

    pub fn service(title: &str) -> Self {
        Self::Service(title.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { chain, hash } => write!(f, "addr:{}:{}", chain, hex::encode(hash)),
            Self::Tag(title) => write!(f, "tag:{}", title),
            Self::Service(title) => write!(f, "service:{}", title),
        }
    }
}
