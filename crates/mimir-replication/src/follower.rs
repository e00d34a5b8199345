use tokio::sync::Mutex;

use mimir_storage::{KvFactory, KvStore, Wal};
use mimir_types::{
    AddEntryRequest, AddEntryResponse, EntryId, FenceRequest, FenceResponse, MimirError, ShardId,
    Status, TruncateRequest, TruncateResponse, WriteBatch,
};

use crate::guards::{check_epoch_equal, check_epoch_later, check_status};
use crate::stream::EntryStream;

/// Handles all replication operations for one shard on the follower side:
/// fencing by a newly elected leader, log alignment via truncation, and the
/// streamed ingestion of replicated entries with commit-driven application
/// to the key-value store.
///
/// One instance exists per shard; it exclusively owns that shard's WAL and
/// KV store. A single lock guards the entire mutable state, and every
/// handler holds it for its full duration (storage calls included) — the
/// protocol depends on atomic read-modify-write over
/// `(epoch, status, head_index, commit_index)` plus the storage side
/// effects.
pub struct FollowerController<W: Wal, F: KvFactory> {
    shard_id: ShardId,
    inner: Mutex<FollowerState<W, F::Store>>,
}

struct FollowerState<W, K> {
    /// Monotonically non-decreasing across the controller's lifetime.
    epoch: u64,
    status: Status,
    /// Id of the highest entry durably in the WAL.
    head_index: EntryId,
    /// Id of the highest entry applied to the KV store. Never exceeds
    /// `head_index`, never regresses, and is not persisted: replay of the
    /// committed prefix after a restart is idempotent.
    commit_index: EntryId,
    wal: W,
    db: K,
    closing: bool,
}

impl<W: Wal, F: KvFactory> FollowerController<W, F> {
    /// Construct the controller for `shard_id`, recovering the head from
    /// the highest entry the WAL holds. The commit index starts at zero
    /// even when the KV store already contains applied writes.
    pub async fn new(shard_id: ShardId, wal: W, kv_factory: &F) -> Result<Self, MimirError> {
        let db = kv_factory.open(shard_id).await?;
        let head_index = wal.highest_entry_at_or_below_epoch(u64::MAX).await?;

        tracing::info!(shard = shard_id, head = %head_index, "created follower");
        Ok(FollowerController {
            shard_id,
            inner: Mutex::new(FollowerState {
                epoch: 0,
                status: Status::NotMember,
                head_index,
                commit_index: EntryId::zero(),
                wal,
                db,
                closing: false,
            }),
        })
    }

    pub fn shard_id(&self) -> ShardId {
        self.shard_id
    }

    /// Snapshot accessors for metrics and tests; never a basis for
    /// protocol decisions.
    pub async fn epoch(&self) -> u64 {
        self.inner.lock().await.epoch
    }

    pub async fn status(&self) -> Status {
        self.inner.lock().await.status
    }

    pub async fn head_index(&self) -> EntryId {
        self.inner.lock().await.head_index
    }

    pub async fn commit_index(&self) -> EntryId {
        self.inner.lock().await.commit_index
    }

    /// A fence request from a newer leader. Accepted in any status — this
    /// is the one operation a legitimately newer leader may send at any
    /// time — provided its epoch strictly increases ours. Raises the epoch,
    /// moves to `Fenced`, and reports the head so the leader can compute
    /// the longest prefix shared by a quorum. Anything retained on behalf
    /// of a prior leader is implicitly dropped by the epoch change.
    pub async fn fence(&self, req: FenceRequest) -> Result<FenceResponse, MimirError> {
        let mut state = self.inner.lock().await;
        if state.closing {
            return Err(MimirError::Closed);
        }
        check_epoch_later(req.epoch, state.epoch)?;

        state.epoch = req.epoch;
        state.status = Status::Fenced;
        tracing::info!(shard = self.shard_id, epoch = state.epoch, "fenced");
        Ok(FenceResponse { epoch: state.epoch, head_index: state.head_index })
    }

    /// A truncate request from the leader whose fence we just accepted:
    /// it names the highest entry to retain, and the pairing is enforced by
    /// requiring `Fenced` status and an exact epoch match. The WAL drops
    /// everything after the target and reports the new physical head, and
    /// the controller becomes a follower.
    ///
    /// The commit index is never touched here. A target below it means the
    /// leader is discarding committed data, which no correct leader does;
    /// that is rejected before the WAL is mutated.
    pub async fn truncate(&self, req: TruncateRequest) -> Result<TruncateResponse, MimirError> {
        let mut state = self.inner.lock().await;
        if state.closing {
            return Err(MimirError::Closed);
        }
        check_status(Status::Fenced, state.status)?;
        check_epoch_equal(req.epoch, state.epoch)?;
        if req.head_index < state.commit_index {
            return Err(MimirError::ProtocolViolation(format!(
                "truncation to {} would drop committed entries up to {}",
                req.head_index, state.commit_index
            )));
        }

        let head_index = state.wal.truncate(req.head_index).await?;
        state.head_index = head_index;
        state.status = Status::Follower;

        tracing::info!(shard = self.shard_id, epoch = state.epoch, head = %head_index, "truncated");
        Ok(TruncateResponse { epoch: state.epoch, head_index })
    }

    /// Run the entry ingestion loop until the stream ends or a fatal error
    /// occurs. Requests are processed strictly in receive order and each
    /// response is sent only after the append (and any commit-driven
    /// application) completed.
    ///
    /// A stale-epoch request is answered in-band (`invalid_epoch = true`)
    /// and does not end the loop; every other failure does, and recovery
    /// then requires a new fence.
    pub async fn add_entries<S: EntryStream>(&self, stream: &mut S) -> Result<(), MimirError> {
        loop {
            let Some(req) = stream.recv().await? else {
                return Ok(());
            };
            let res = self.add_entry(req).await?;
            stream.send(res).await?;
        }
    }

    async fn add_entry(&self, req: AddEntryRequest) -> Result<AddEntryResponse, MimirError> {
        let mut state = self.inner.lock().await;
        if state.closing {
            return Err(MimirError::Closed);
        }
        if state.status != Status::Follower && state.status != Status::Fenced {
            return Err(MimirError::InvalidStatus {
                expected: Status::Follower,
                actual: state.status,
            });
        }

        if req.epoch < state.epoch {
            // Rejection of a stale leader. The response carries the
            // request's epoch, not ours, so the sender recognizes it as
            // addressed to itself.
            return Ok(AddEntryResponse {
                epoch: req.epoch,
                entry_id: None,
                invalid_epoch: true,
            });
        }

        let entry_id = req.entry.entry_id;
        if entry_id.epoch != req.epoch {
            return Err(MimirError::ProtocolViolation(format!(
                "entry {} carried in a request for epoch {}",
                entry_id, req.epoch
            )));
        }

        // Accept. The epoch may move forward here without a fence at that
        // epoch: a freshly elected leader streams directly after fencing a
        // quorum, which need not have included us.
        state.status = Status::Follower;
        state.epoch = req.epoch;

        state.wal.append(req.entry).await?;
        state.head_index = entry_id;

        if req.commit_index > state.head_index {
            return Err(MimirError::ProtocolViolation(format!(
                "commit index {} is beyond head {}",
                req.commit_index, state.head_index
            )));
        }

        if req.commit_index > state.commit_index {
            let from = state.commit_index;
            let entries = state.wal.read_range(from, req.commit_index).await?;
            for entry in entries {
                let batch = WriteBatch::decode(&entry.value)?;
                state.db.process_write(batch).await?;
            }
            state.commit_index = req.commit_index;
        }

        Ok(AddEntryResponse {
            epoch: state.epoch,
            entry_id: Some(entry_id),
            invalid_epoch: false,
        })
    }

    /// Close the WAL, then the KV store. Both are attempted even if the
    /// first fails; the first error is reported. Every later request on
    /// this controller fails with `Closed`.
    pub async fn close(&self) -> Result<(), MimirError> {
        let mut state = self.inner.lock().await;
        if state.closing {
            return Err(MimirError::Closed);
        }
        state.closing = true;

        let wal_res = state.wal.close().await;
        let db_res = state.db.close().await;
        tracing::info!(shard = self.shard_id, "closed follower");
        wal_res.and(db_res)
    }
}
