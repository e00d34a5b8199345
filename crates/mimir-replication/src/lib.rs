//! Follower-side replication state machine.
//!
//! One [`FollowerController`] exists per shard. It participates in leader
//! election by accepting fences, aligns its write-ahead log with a newly
//! elected leader via truncation, ingests the leader's entry stream, and
//! applies committed entries to the shard's key-value store.

pub mod follower;
pub mod guards;
pub mod stream;

pub use follower::FollowerController;
pub use stream::EntryStream;
