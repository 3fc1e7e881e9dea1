// In-process KV namespace
//
// Sorted map of key -> (value, expiry). Expired keys are invisible to get and
// list and are purged lazily on write. The cursor is the hex encoding of the
// last key of the previous page, so it means nothing to callers.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;

use async_trait::async_trait;

use super::{KvNamespace, ListKey, ListOptions, ListResult, PutOptions};
use crate::error::{FingerprintError, Result};
use crate::runtime::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<u64>,
}

/// Memory-backed [`KvNamespace`]
pub struct MemoryKv {
    entries: RefCell<BTreeMap<String, Entry>>,
    clock: Rc<dyn Clock>,
    reads: Cell<usize>,
    writes: Cell<usize>,
    failing_prefix: RefCell<Option<String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_clock(Rc::new(SystemClock))
    }

    pub fn with_clock(clock: Rc<dyn Clock>) -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            clock,
            reads: Cell::new(0),
            writes: Cell::new(0),
            failing_prefix: RefCell::new(None),
        }
    }

    /// Number of `get` and `list` calls served
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Number of successful `put` calls
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    /// Make every `put` to a key starting with `prefix` fail
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<String>) {
        *self.failing_prefix.borrow_mut() = Some(prefix.into());
    }

    /// Live (unexpired) keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        self.entries
            .borrow()
            .iter()
            .filter(|(_, e)| is_live(e, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn purge_expired(&self, now: u64) {
        self.entries.borrow_mut().retain(|_, e| is_live(e, now));
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live(entry: &Entry, now_ms: u64) -> bool {
    entry.expires_at_ms.map_or(true, |at| at > now_ms)
}

#[async_trait(?Send)]
impl KvNamespace for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.reads.set(self.reads.get() + 1);
        let now = self.clock.now_ms();
        Ok(self
            .entries
            .borrow()
            .get(key)
            .filter(|e| is_live(e, now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<()> {
        if let Some(prefix) = self.failing_prefix.borrow().as_deref() {
            if key.starts_with(prefix) {
                return Err(FingerprintError::Storage(format!("put {} rejected", key)));
            }
        }

        let now = self.clock.now_ms();
        self.purge_expired(now);
        let expires_at_ms = options.expiration_ttl.map(|ttl| now + ttl * 1000);
        self.entries.borrow_mut().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult> {
        self.reads.set(self.reads.get() + 1);
        let now = self.clock.now_ms();
        let limit = options.effective_limit();
        let prefix = options.prefix.unwrap_or_default();

        let start = match options.cursor.as_deref() {
            Some(cursor) => Bound::Excluded(decode_cursor(cursor)?),
            None => Bound::Included(prefix.clone()),
        };

        let entries = self.entries.borrow();
        let mut matching = entries
            .range((start, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, e)| is_live(e, now));

        let keys: Vec<ListKey> = matching
            .by_ref()
            .take(limit)
            .map(|(k, e)| ListKey {
                name: k.clone(),
                expiration: e.expires_at_ms.map(|ms| ms / 1000),
            })
            .collect();

        let list_complete = matching.next().is_none();
        let cursor = match (list_complete, keys.last()) {
            (false, Some(last)) => Some(hex::encode(&last.name)),
            _ => None,
        };

        Ok(ListResult {
            keys,
            list_complete,
            cursor,
        })
    }
}

fn decode_cursor(cursor: &str) -> Result<String> {
    hex::decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| FingerprintError::Storage(format!("invalid cursor: {}", cursor)))
}
