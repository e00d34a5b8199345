use std::future::Future;

use mimir_types::{AddEntryRequest, AddEntryResponse, MimirError};

/// Transport face of the entry ingestion loop.
///
/// The controller's loop is transport-agnostic: it pulls requests with
/// `recv` and pushes responses with `send`, strictly in order. The gRPC
/// server adapts a bidirectional stream onto this; tests drive it with a
/// scripted in-memory implementation.
///
/// Uses RPITIT (`-> impl Future + Send`) matching the storage traits in
/// `mimir-storage`.
pub trait EntryStream: Send {
    /// Next request from the leader, or `None` once the stream ended
    /// cleanly. A transport failure surfaces as an error and ends the loop.
    fn recv(&mut self)
        -> impl Future<Output = Result<Option<AddEntryRequest>, MimirError>> + Send;

    fn send(
        &mut self,
        response: AddEntryResponse,
    ) -> impl Future<Output = Result<(), MimirError>> + Send;
}
