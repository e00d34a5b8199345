use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use tokio::sync::RwLock;

use mimir_types::{EntryId, LogEntry, MimirError, ShardId, WriteBatch, WriteOp};

use crate::traits::{KvFactory, KvStore, Wal};

// ---------------------------------------------------------------------------
// MemWal
// ---------------------------------------------------------------------------

/// In-memory [`Wal`] backed by a `BTreeMap`.
///
/// Intended for unit tests; not persisted across restarts. Cloning shares
/// the underlying map, which lets a test close a controller and construct a
/// new one over the same log contents.
#[derive(Clone)]
pub struct MemWal {
    inner: Arc<RwLock<BTreeMap<EntryId, LogEntry>>>,
}

impl MemWal {
    pub fn new() -> Self {
        MemWal { inner: Arc::new(RwLock::new(BTreeMap::new())) }
    }

    /// Number of entries currently in the log.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for MemWal {
    fn default() -> Self {
        Self::new()
    }
}

impl Wal for MemWal {
    async fn append(&self, entry: LogEntry) -> Result<(), MimirError> {
        // Exact-id re-append overwrites in place.
        self.inner.write().await.insert(entry.entry_id, entry);
        Ok(())
    }

    async fn truncate(&self, head: EntryId) -> Result<EntryId, MimirError> {
        let mut g = self.inner.write().await;
        g.retain(|id, _| *id <= head);
        Ok(g.keys().next_back().copied().unwrap_or_else(EntryId::zero))
    }

    async fn read_range(&self, after: EntryId, up_to: EntryId) -> Result<Vec<LogEntry>, MimirError> {
        if up_to <= after {
            return Ok(Vec::new());
        }
        let g = self.inner.read().await;
        Ok(g.range((Bound::Excluded(after), Bound::Included(up_to)))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn highest_entry_at_or_below_epoch(&self, epoch: u64) -> Result<EntryId, MimirError> {
        let g = self.inner.read().await;
        Ok(g.range(..=EntryId::new(epoch, u64::MAX))
            .next_back()
            .map(|(id, _)| *id)
            .unwrap_or_else(EntryId::zero))
    }

    async fn close(&self) -> Result<(), MimirError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemKv
// ---------------------------------------------------------------------------

/// In-memory [`KvStore`] backed by a `BTreeMap`. Clones share contents.
#[derive(Clone)]
pub struct MemKv {
    inner: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    applied: Arc<RwLock<Vec<WriteBatch>>>,
}

impl MemKv {
    pub fn new() -> Self {
        MemKv {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
            applied: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Every batch passed to `process_write`, in application order. Lets
    /// tests assert exactly what the replication layer committed.
    pub async fn applied_batches(&self) -> Vec<WriteBatch> {
        self.applied.read().await.clone()
    }
}

impl Default for MemKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemKv {
    async fn process_write(&self, batch: WriteBatch) -> Result<(), MimirError> {
        let mut g = self.inner.write().await;
        for op in &batch.writes {
            match op {
                WriteOp::Put { key, value } => {
                    g.insert(key.clone(), value.clone());
                }
                WriteOp::Delete { key } => {
                    g.remove(key);
                }
            }
        }
        drop(g);
        self.applied.write().await.push(batch);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MimirError> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn close(&self) -> Result<(), MimirError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemKvFactory
// ---------------------------------------------------------------------------

/// [`KvFactory`] handing out one shared [`MemKv`] per shard, so a test can
/// open the same store the controller writes to.
#[derive(Clone, Default)]
pub struct MemKvFactory {
    stores: Arc<RwLock<HashMap<ShardId, MemKv>>>,
}

impl MemKvFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvFactory for MemKvFactory {
    type Store = MemKv;

    async fn open(&self, shard_id: ShardId) -> Result<MemKv, MimirError> {
        let mut g = self.stores.write().await;
        Ok(g.entry(shard_id).or_insert_with(MemKv::new).clone())
    }
}
