use std::path::Path;
use std::sync::Arc;

use mimir_types::{EntryId, LogEntry, MimirError, ShardId, WriteBatch, WriteOp};

use crate::keys::{data_key, decode_log_key, log_key, log_shard_max};
use crate::traits::{KvFactory, KvStore, Wal};

fn encode<T: serde::Serialize>(val: &T) -> Result<Vec<u8>, MimirError> {
    bincode::serde::encode_to_vec(val, bincode::config::standard())
        .map_err(|e| MimirError::Storage(e.to_string()))
}

fn decode<T: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<T, MimirError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(v, _)| v)
        .map_err(|e| MimirError::Storage(e.to_string()))
}

fn fjall_err(e: fjall::Error) -> MimirError {
    MimirError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// FjallStore — shared handle wrapping both keyspaces
// ---------------------------------------------------------------------------

/// Shared storage handle.
///
/// Both keyspaces live in a single fjall `Database` so a write batch that
/// touches several keys commits atomically. All shards of a node share one
/// store; per-shard handles carve out their key range via the shard prefix.
pub struct FjallStore {
    /// The underlying fjall database.
    pub db: fjall::Database,
    /// Log entries: `shard(4) ++ epoch(8) ++ offset(8)` → bincode(LogEntry)
    pub log: fjall::Keyspace,
    /// Current key-value data: `shard(4) ++ key_utf8` → raw value bytes
    pub data: fjall::Keyspace,
}

impl FjallStore {
    /// Open (or create) a `FjallStore` at `path`.
    pub fn open(path: &Path) -> Result<Arc<Self>, MimirError> {
        let db = fjall::Database::builder(path).open().map_err(fjall_err)?;
        let log =
            db.keyspace("log", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        let data =
            db.keyspace("data", fjall::KeyspaceCreateOptions::default).map_err(fjall_err)?;
        Ok(Arc::new(FjallStore { db, log, data }))
    }
}

// ---------------------------------------------------------------------------
// FjallWal
// ---------------------------------------------------------------------------

/// [`Wal`] backed by fjall.
///
/// All blocking I/O is wrapped in `tokio::task::spawn_blocking`. Exact-id
/// re-appends overwrite the stored entry in place, which keeps retries from
/// a resending leader idempotent.
pub struct FjallWal {
    store: Arc<FjallStore>,
    shard_id: ShardId,
}

impl FjallWal {
    pub fn new(store: Arc<FjallStore>, shard_id: ShardId) -> Self {
        FjallWal { store, shard_id }
    }
}

impl Wal for FjallWal {
    async fn append(&self, entry: LogEntry) -> Result<(), MimirError> {
        let store = self.store.clone();
        let shard_id = self.shard_id;
        tokio::task::spawn_blocking(move || -> Result<(), MimirError> {
            let key = log_key(shard_id, entry.entry_id).to_vec();
            store.log.insert(key, encode(&entry)?).map_err(fjall_err)
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn truncate(&self, head: EntryId) -> Result<EntryId, MimirError> {
        let store = self.store.clone();
        let shard_id = self.shard_id;
        tokio::task::spawn_blocking(move || -> Result<EntryId, MimirError> {
            let start = log_key(shard_id, EntryId::zero()).to_vec();
            let end = log_shard_max(shard_id).to_vec();

            // Collect ids strictly after `head`, tracking the surviving head.
            let mut new_head = EntryId::zero();
            let mut doomed: Vec<Vec<u8>> = Vec::new();
            for guard in store.log.range(start..=end) {
                let (k, _) = guard.into_inner().map_err(fjall_err)?;
                let id = decode_log_key(&k)?;
                if id > head {
                    doomed.push(k.to_vec());
                } else {
                    new_head = id;
                }
            }

            if !doomed.is_empty() {
                let mut batch = store.db.batch();
                for k in doomed {
                    batch.remove(&store.log, k);
                }
                batch.commit().map_err(fjall_err)?;
            }
            Ok(new_head)
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn read_range(&self, after: EntryId, up_to: EntryId) -> Result<Vec<LogEntry>, MimirError> {
        let store = self.store.clone();
        let shard_id = self.shard_id;
        tokio::task::spawn_blocking(move || -> Result<Vec<LogEntry>, MimirError> {
            if up_to <= after {
                return Ok(Vec::new());
            }
            // The range starts at `after`'s own key; the filter below makes
            // the lower bound exclusive.
            let start = log_key(shard_id, after).to_vec();
            let end = log_key(shard_id, up_to).to_vec();

            let mut out = Vec::new();
            for guard in store.log.range(start..=end) {
                let (_, v) = guard.into_inner().map_err(fjall_err)?;
                let entry: LogEntry = decode(&v)?;
                if entry.entry_id > after {
                    out.push(entry);
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn highest_entry_at_or_below_epoch(&self, epoch: u64) -> Result<EntryId, MimirError> {
        let store = self.store.clone();
        let shard_id = self.shard_id;
        tokio::task::spawn_blocking(move || -> Result<EntryId, MimirError> {
            let start = log_key(shard_id, EntryId::zero()).to_vec();
            let end = log_key(shard_id, EntryId::new(epoch, u64::MAX)).to_vec();

            let mut highest = EntryId::zero();
            for guard in store.log.range(start..=end) {
                let (k, _) = guard.into_inner().map_err(fjall_err)?;
                highest = decode_log_key(&k)?;
            }
            Ok(highest)
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn close(&self) -> Result<(), MimirError> {
        // The database handle is shared across shards; per-shard close has
        // nothing to flush beyond what each committed batch already did.
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FjallKv
// ---------------------------------------------------------------------------

/// [`KvStore`] backed by fjall. One write batch commits atomically.
pub struct FjallKv {
    store: Arc<FjallStore>,
    shard_id: ShardId,
}

impl FjallKv {
    pub fn new(store: Arc<FjallStore>, shard_id: ShardId) -> Self {
        FjallKv { store, shard_id }
    }
}

impl KvStore for FjallKv {
    async fn process_write(&self, write_batch: WriteBatch) -> Result<(), MimirError> {
        let store = self.store.clone();
        let shard_id = self.shard_id;
        tokio::task::spawn_blocking(move || -> Result<(), MimirError> {
            let mut batch = store.db.batch();
            for op in &write_batch.writes {
                match op {
                    WriteOp::Put { key, value } => {
                        batch.insert(&store.data, data_key(shard_id, key), value.clone());
                    }
                    WriteOp::Delete { key } => {
                        batch.remove(&store.data, data_key(shard_id, key));
                    }
                }
            }
            batch.commit().map_err(fjall_err)
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, MimirError> {
        let store = self.store.clone();
        let key = data_key(self.shard_id, key);
        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, MimirError> {
            match store.data.get(key).map_err(fjall_err)? {
                Some(v) => Ok(Some(v.to_vec())),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| MimirError::Storage(e.to_string()))?
    }

    async fn close(&self) -> Result<(), MimirError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FjallKvFactory
// ---------------------------------------------------------------------------

/// [`KvFactory`] handing out per-shard [`FjallKv`] views over one store.
pub struct FjallKvFactory {
    store: Arc<FjallStore>,
}

impl FjallKvFactory {
    pub fn new(store: Arc<FjallStore>) -> Self {
        FjallKvFactory { store }
    }
}

impl KvFactory for FjallKvFactory {
    type Store = FjallKv;

    async fn open(&self, shard_id: ShardId) -> Result<FjallKv, MimirError> {
        Ok(FjallKv::new(self.store.clone(), shard_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(epoch: u64, offset: u64) -> LogEntry {
        LogEntry { entry_id: EntryId::new(epoch, offset), value: vec![epoch as u8, offset as u8] }
    }

    fn open_store(dir: &std::path::Path) -> Arc<FjallStore> {
        FjallStore::open(dir).expect("open store")
    }

    #[tokio::test]
    async fn wal_append_read_truncate() {
        let dir = tempfile::tempdir().unwrap();
        let wal = FjallWal::new(open_store(dir.path()), 0);

        for off in 0..5 {
            wal.append(entry(1, off)).await.unwrap();
        }

        let got = wal.read_range(EntryId::new(1, 1), EntryId::new(1, 3)).await.unwrap();
        let ids: Vec<EntryId> = got.iter().map(|e| e.entry_id).collect();
        assert_eq!(ids, vec![EntryId::new(1, 2), EntryId::new(1, 3)]);

        let head = wal.truncate(EntryId::new(1, 2)).await.unwrap();
        assert_eq!(head, EntryId::new(1, 2));
        assert_eq!(
            wal.highest_entry_at_or_below_epoch(u64::MAX).await.unwrap(),
            EntryId::new(1, 2)
        );
    }

    #[tokio::test]
    async fn wal_truncate_to_absent_id_returns_next_lower() {
        let dir = tempfile::tempdir().unwrap();
        let wal = FjallWal::new(open_store(dir.path()), 0);

        wal.append(entry(4, 3)).await.unwrap();
        wal.append(entry(4, 9)).await.unwrap();

        let head = wal.truncate(EntryId::new(4, 7)).await.unwrap();
        assert_eq!(head, EntryId::new(4, 3));
    }

    #[tokio::test]
    async fn wal_highest_entry_respects_epoch_bound() {
        let dir = tempfile::tempdir().unwrap();
        let wal = FjallWal::new(open_store(dir.path()), 0);

        wal.append(entry(2, 5)).await.unwrap();
        wal.append(entry(4, 1)).await.unwrap();

        assert_eq!(wal.highest_entry_at_or_below_epoch(3).await.unwrap(), EntryId::new(2, 5));
        assert_eq!(wal.highest_entry_at_or_below_epoch(4).await.unwrap(), EntryId::new(4, 1));
        assert_eq!(wal.highest_entry_at_or_below_epoch(1).await.unwrap(), EntryId::zero());
    }

    #[tokio::test]
    async fn wal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let wal = FjallWal::new(open_store(dir.path()), 0);
            wal.append(entry(3, 0)).await.unwrap();
            wal.close().await.unwrap();
        }
        let wal = FjallWal::new(open_store(dir.path()), 0);
        assert_eq!(
            wal.highest_entry_at_or_below_epoch(u64::MAX).await.unwrap(),
            EntryId::new(3, 0)
        );
    }

    #[tokio::test]
    async fn wal_shards_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let wal0 = FjallWal::new(store.clone(), 0);
        let wal1 = FjallWal::new(store, 1);

        wal0.append(entry(1, 0)).await.unwrap();

        assert_eq!(wal1.highest_entry_at_or_below_epoch(u64::MAX).await.unwrap(), EntryId::zero());
        assert_eq!(
            wal0.highest_entry_at_or_below_epoch(u64::MAX).await.unwrap(),
            EntryId::new(1, 0)
        );
    }

    #[tokio::test]
    async fn kv_write_batch_applies_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FjallKvFactory::new(open_store(dir.path()));
        let kv = factory.open(0).await.unwrap();

        kv.process_write(WriteBatch {
            writes: vec![
                WriteOp::Put { key: "a".into(), value: b"1".to_vec() },
                WriteOp::Put { key: "b".into(), value: b"2".to_vec() },
                WriteOp::Delete { key: "a".into() },
            ],
        })
        .await
        .unwrap();

        assert_eq!(kv.get("a").await.unwrap(), None);
        assert_eq!(kv.get("b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn kv_shards_are_disjoint() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FjallKvFactory::new(open_store(dir.path()));
        let kv0 = factory.open(0).await.unwrap();
        let kv1 = factory.open(1).await.unwrap();

        kv0.process_write(WriteBatch {
            writes: vec![WriteOp::Put { key: "k".into(), value: b"v".to_vec() }],
        })
        .await
        .unwrap();

        assert_eq!(kv1.get("k").await.unwrap(), None);
    }
}
