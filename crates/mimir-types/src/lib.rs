use std::fmt;

pub type ShardId = u32;

/// Identifier of a single entry in a shard's write-ahead log.
///
/// Ordered lexicographically on `(epoch, offset)`, which the derived
/// `Ord` provides given the field order. `EntryId::zero()` is the
/// sentinel for "no entry".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct EntryId {
    pub epoch: u64,
    pub offset: u64,
}

impl EntryId {
    pub const fn new(epoch: u64, offset: u64) -> Self {
        EntryId { epoch, offset }
    }

    /// The "no entry" sentinel: `(0, 0)`.
    pub const fn zero() -> Self {
        EntryId { epoch: 0, offset: 0 }
    }

    pub fn is_zero(&self) -> bool {
        *self == EntryId::zero()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, self.offset)
    }
}

/// One replicated log entry. `value` is an opaque serialized [`WriteBatch`]
/// produced by the leader; followers never interpret it until commit time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub entry_id: EntryId,
    pub value: Vec<u8>,
}

/// Replication role of a shard's follower controller.
///
/// Transitions are driven only by protocol events: `Fence` moves any status
/// to `Fenced`; `Truncate` and accepted `AddEntry` requests move `Fenced`
/// to `Follower`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// Initial state: not yet part of any leader's ensemble. No entries may
    /// be appended and no truncation is accepted.
    NotMember,
    /// Fenced by a leader election; rejecting prior leaders, not yet
    /// replicating.
    Fenced,
    /// Actively replicating entries from the current leader.
    Follower,
}

// ---------------------------------------------------------------------------
// Replication protocol messages (domain form; proto counterparts live in
// mimir-proto and are converted at the server edge)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceRequest {
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceResponse {
    pub epoch: u64,
    /// The follower's head at the instant it was fenced; the new leader uses
    /// this to compute the longest prefix shared by a quorum.
    pub head_index: EntryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateRequest {
    pub epoch: u64,
    /// Highest entry id the follower should retain.
    pub head_index: EntryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncateResponse {
    pub epoch: u64,
    pub head_index: EntryId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddEntryRequest {
    pub epoch: u64,
    pub entry: LogEntry,
    pub commit_index: EntryId,
}

/// `invalid_epoch == true` always co-occurs with `entry_id == None`: the
/// response then echoes the stale request's epoch so the rejected leader
/// recognizes the rejection as addressed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddEntryResponse {
    pub epoch: u64,
    pub entry_id: Option<EntryId>,
    pub invalid_epoch: bool,
}

// ---------------------------------------------------------------------------
// Write batches
// ---------------------------------------------------------------------------

/// One operation inside a replicated write batch.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// The unit of application to the key-value store. Ops apply in order, and
/// re-applying a batch (or any prefix of batches in log order) is
/// idempotent: each op is deterministic last-write-wins on its key.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WriteBatch {
    pub writes: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn encode(&self) -> Result<Vec<u8>, MimirError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| MimirError::Codec(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MimirError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(v, _)| v)
            .map_err(|e| MimirError::Codec(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MimirError {
    /// The request's epoch violates the ordering its handler requires.
    /// Non-fatal: state is unchanged, and in the entry stream it is
    /// reported in-band rather than terminating the stream.
    #[error("invalid epoch: got {observed} while at {current}")]
    InvalidEpoch { observed: u64, current: u64 },

    /// The handler was called in a status that forbids it. Fatal for the
    /// operation; terminates an entry stream.
    #[error("invalid status: expected {expected:?}, found {actual:?}")]
    InvalidStatus { expected: Status, actual: Status },

    /// The leader sent something no correct leader sends (entry epoch
    /// disagreeing with the request epoch, a commit index beyond the head,
    /// a truncation below committed data). Fatal.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The controller has been closed; no further requests are served.
    #[error("controller is closed")]
    Closed,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("codec error: {0}")]
    Codec(String),

    /// Stream transport failure (recv or send); ends the ingestion loop.
    #[error("transport error: {0}")]
    Transport(String),
}
