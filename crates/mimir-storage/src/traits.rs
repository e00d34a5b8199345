use std::future::Future;

use mimir_types::{EntryId, LogEntry, MimirError, ShardId, WriteBatch};

/// Write-ahead log for a single shard, ordered by [`EntryId`].
///
/// Methods use RPITIT (`-> impl Future + Send`) matching the controller
/// trait style in `mimir-replication`. This avoids any `async-trait`
/// dependency.
///
/// A `Wal` handle is exclusively owned by one follower controller; the
/// controller serializes all calls under its own lock.
pub trait Wal: Send + Sync + 'static {
    /// Durably append `entry`.
    ///
    /// Appending the exact id the log already holds overwrites it in place,
    /// so a retrying leader's duplicate append lands as a no-op.
    fn append(&self, entry: LogEntry) -> impl Future<Output = Result<(), MimirError>> + Send;

    /// Remove every entry strictly after `head` and return the new physical
    /// head: `head` itself when present, else the next-lower present id,
    /// else [`EntryId::zero`].
    fn truncate(&self, head: EntryId) -> impl Future<Output = Result<EntryId, MimirError>> + Send;

    /// Return the entries with id strictly greater than `after` and at most
    /// `up_to`, in id order.
    fn read_range(
        &self,
        after: EntryId,
        up_to: EntryId,
    ) -> impl Future<Output = Result<Vec<LogEntry>, MimirError>> + Send;

    /// Highest stored entry id whose epoch is at most `epoch`, or
    /// [`EntryId::zero`] when the log holds none. Called with
    /// `u64::MAX` to recover the head on startup.
    fn highest_entry_at_or_below_epoch(
        &self,
        epoch: u64,
    ) -> impl Future<Output = Result<EntryId, MimirError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), MimirError>> + Send;
}

/// Key-value store for a single shard.
///
/// `process_write` applies one committed batch; each op is deterministic
/// last-write-wins on its key, so replaying the committed prefix from the
/// start of the log is safe. The follower controller relies on this after a
/// restart, when the commit index resets to zero.
pub trait KvStore: Send + Sync + 'static {
    fn process_write(
        &self,
        batch: WriteBatch,
    ) -> impl Future<Output = Result<(), MimirError>> + Send;

    /// Current value for `key`, if any. Not used on the replication path;
    /// exists for read serving and tests.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, MimirError>> + Send;

    fn close(&self) -> impl Future<Output = Result<(), MimirError>> + Send;
}

/// Constructs the key-value store for a shard at controller startup.
pub trait KvFactory: Send + Sync + 'static {
    type Store: KvStore;

    fn open(
        &self,
        shard_id: ShardId,
    ) -> impl Future<Output = Result<Self::Store, MimirError>> + Send;
}
