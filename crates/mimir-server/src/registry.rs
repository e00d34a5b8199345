use std::collections::HashMap;
use std::sync::Arc;

use mimir_replication::FollowerController;
use mimir_storage::{KvFactory, Wal};
use mimir_types::ShardId;

/// The follower controllers hosted by this node, one per shard.
///
/// Built once at startup and read-only afterwards, so lookups need no lock.
pub struct ShardRegistry<W: Wal, F: KvFactory> {
    shards: HashMap<ShardId, Arc<FollowerController<W, F>>>,
}

impl<W: Wal, F: KvFactory> ShardRegistry<W, F> {
    pub fn new() -> Self {
        ShardRegistry { shards: HashMap::new() }
    }

    pub fn insert(&mut self, controller: FollowerController<W, F>) {
        self.shards.insert(controller.shard_id(), Arc::new(controller));
    }

    pub fn get(&self, shard_id: ShardId) -> Option<Arc<FollowerController<W, F>>> {
        self.shards.get(&shard_id).cloned()
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids: Vec<ShardId> = self.shards.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<W: Wal, F: KvFactory> Default for ShardRegistry<W, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use mimir_storage::mem::{MemKvFactory, MemWal};

    use super::*;

    #[tokio::test]
    async fn lookup_by_shard_id() {
        let factory = MemKvFactory::new();
        let mut registry = ShardRegistry::new();
        for shard_id in [3u32, 1, 2] {
            let fc = FollowerController::new(shard_id, MemWal::new(), &factory).await.unwrap();
            registry.insert(fc);
        }

        assert_eq!(registry.shard_ids(), vec![1, 2, 3]);
        assert_eq!(registry.get(2).unwrap().shard_id(), 2);
        assert!(registry.get(9).is_none());
    }
}
