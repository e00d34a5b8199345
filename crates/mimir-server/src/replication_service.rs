use std::sync::Arc;

use mimir_proto::v1::{self as pb, log_replication_server::LogReplication};
use mimir_replication::EntryStream;
use mimir_storage::{KvFactory, Wal};
use mimir_types::{AddEntryRequest, AddEntryResponse, MimirError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::convert::{
    add_entry_request_from_proto, add_entry_response_to_proto, fence_request_from_proto,
    fence_response_to_proto, mimir_to_status, truncate_request_from_proto,
    truncate_response_to_proto,
};
use crate::registry::ShardRegistry;

const RESPONSE_CHANNEL_CAPACITY: usize = 16;

pub struct ReplicationServiceImpl<W: Wal, F: KvFactory> {
    registry: Arc<ShardRegistry<W, F>>,
}

impl<W: Wal, F: KvFactory> ReplicationServiceImpl<W, F> {
    pub fn new(registry: Arc<ShardRegistry<W, F>>) -> Self {
        ReplicationServiceImpl { registry }
    }
}

fn unknown_shard(shard_id: u32) -> Status {
    Status::not_found(format!("unknown shard {shard_id}"))
}

#[tonic::async_trait]
impl<W: Wal, F: KvFactory> LogReplication for ReplicationServiceImpl<W, F> {
    async fn fence(
        &self,
        request: Request<pb::FenceRequest>,
    ) -> Result<Response<pb::FenceResponse>, Status> {
        let req = request.into_inner();
        let controller = self.registry.get(req.shard_id).ok_or_else(|| unknown_shard(req.shard_id))?;
        let res = controller
            .fence(fence_request_from_proto(req))
            .await
            .map_err(mimir_to_status)?;
        Ok(Response::new(fence_response_to_proto(res)))
    }

    async fn truncate(
        &self,
        request: Request<pb::TruncateRequest>,
    ) -> Result<Response<pb::TruncateResponse>, Status> {
        let req = request.into_inner();
        let controller = self.registry.get(req.shard_id).ok_or_else(|| unknown_shard(req.shard_id))?;
        let req = truncate_request_from_proto(req).map_err(mimir_to_status)?;
        let res = controller.truncate(req).await.map_err(mimir_to_status)?;
        Ok(Response::new(truncate_response_to_proto(res)))
    }

    type AddEntriesStream = ReceiverStream<Result<pb::AddEntryResponse, Status>>;

    async fn add_entries(
        &self,
        request: Request<Streaming<pb::AddEntryRequest>>,
    ) -> Result<Response<Self::AddEntriesStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let registry = self.registry.clone();

        tokio::spawn(async move {
            // The first request selects the shard; the controller then owns
            // the loop until the stream ends or a fatal error occurs.
            let first = match inbound.message().await {
                Ok(Some(req)) => req,
                Ok(None) => return,
                Err(status) => {
                    let _ = tx.send(Err(status)).await;
                    return;
                }
            };

            let Some(controller) = registry.get(first.shard_id) else {
                let _ = tx.send(Err(unknown_shard(first.shard_id))).await;
                return;
            };

            let mut stream =
                GrpcEntryStream { first: Some(first), inbound, tx: tx.clone() };
            if let Err(err) = controller.add_entries(&mut stream).await {
                tracing::warn!(
                    shard = controller.shard_id(),
                    error = %err,
                    "entry stream terminated"
                );
                let _ = tx.send(Err(mimir_to_status(err))).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Adapts a gRPC bidirectional stream onto the controller's transport-
/// agnostic [`EntryStream`].
struct GrpcEntryStream {
    first: Option<pb::AddEntryRequest>,
    inbound: Streaming<pb::AddEntryRequest>,
    tx: mpsc::Sender<Result<pb::AddEntryResponse, Status>>,
}

impl EntryStream for GrpcEntryStream {
    async fn recv(&mut self) -> Result<Option<AddEntryRequest>, MimirError> {
        let next = match self.first.take() {
            Some(req) => Some(req),
            None => self
                .inbound
                .message()
                .await
                .map_err(|s| MimirError::Transport(s.to_string()))?,
        };
        next.map(add_entry_request_from_proto).transpose()
    }

    async fn send(&mut self, response: AddEntryResponse) -> Result<(), MimirError> {
        self.tx
            .send(Ok(add_entry_response_to_proto(response)))
            .await
            .map_err(|_| MimirError::Transport("response stream closed".into()))
    }
}
