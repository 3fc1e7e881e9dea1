// Key-value storage for the edge endpoints
//
// Provides the namespace abstraction the handlers persist through:
// - JsKv: the host runtime's KV binding (promise-based get/put/list)
// - MemoryKv: in-process namespace with TTL expiry, for native use and tests
//
// Values are strings; expiry is per key; listing is lexicographic with an
// opaque continuation cursor.

mod js_kv;
mod memory;

pub use js_kv::JsKv;
pub use memory::MemoryKv;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest page a single `list` call returns
pub const MAX_LIST_LIMIT: usize = 1000;

/// Options for [`KvNamespace::put`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Seconds until the key expires; `None` keeps it forever
    pub expiration_ttl: Option<u64>,
}

impl PutOptions {
    pub fn ttl(seconds: u64) -> Self {
        Self {
            expiration_ttl: Some(seconds),
        }
    }
}

/// Options for [`KvNamespace::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl ListOptions {
    /// Requested page size clamped to `1..=MAX_LIST_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

/// One listed key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListKey {
    pub name: String,
    /// Expiry as seconds since the epoch, if the key has one
    #[serde(default)]
    pub expiration: Option<u64>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    pub keys: Vec<ListKey>,
    pub list_complete: bool,
    /// Continuation cursor; present only when `list_complete` is false
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A string key-value namespace
///
/// Operations are independent: there are no transactions, and a
/// read-modify-write by two concurrent callers resolves to whichever put
/// lands last.
#[async_trait(?Send)]
pub trait KvNamespace {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<()>;

    async fn list(&self, options: ListOptions) -> Result<ListResult>;
}
