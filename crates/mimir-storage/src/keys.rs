use mimir_types::{EntryId, MimirError, ShardId};

/// `log` partition: `shard(4) ++ epoch(8) ++ offset(8)` — fixed 20 bytes.
/// Big-endian on all components → lexicographic order = (shard, EntryId)
/// order, so range scans walk entries in id order.
pub fn log_key(shard_id: ShardId, id: EntryId) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..4].copy_from_slice(&shard_id.to_be_bytes());
    key[4..12].copy_from_slice(&id.epoch.to_be_bytes());
    key[12..].copy_from_slice(&id.offset.to_be_bytes());
    key
}

/// Recover the [`EntryId`] encoded in a `log` partition key.
pub fn decode_log_key(key: &[u8]) -> Result<EntryId, MimirError> {
    if key.len() != 20 {
        return Err(MimirError::Storage(format!("malformed log key: {} bytes", key.len())));
    }
    let epoch = u64::from_be_bytes(key[4..12].try_into().expect("8 bytes"));
    let offset = u64::from_be_bytes(key[12..].try_into().expect("8 bytes"));
    Ok(EntryId::new(epoch, offset))
}

/// Inclusive upper bound for a shard's log keys: the largest possible id.
pub fn log_shard_max(shard_id: ShardId) -> [u8; 20] {
    log_key(shard_id, EntryId::new(u64::MAX, u64::MAX))
}

/// `data` partition: `shard(4) ++ key_utf8` → raw value bytes.
pub fn data_key(shard_id: ShardId, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + key.len());
    buf.extend_from_slice(&shard_id.to_be_bytes());
    buf.extend_from_slice(key.as_bytes());
    buf
}
