mod convert;
mod registry;
mod replication_service;

use std::net::SocketAddr;
use std::sync::Arc;

use mimir_proto::v1::log_replication_server::LogReplicationServer;
use mimir_storage::{KvFactory, Wal};
use tonic_reflection::server::Builder as ReflectionBuilder;

use replication_service::ReplicationServiceImpl;

pub use registry::ShardRegistry;

pub async fn serve_replication<W: Wal, F: KvFactory>(
    addr: SocketAddr,
    registry: Arc<ShardRegistry<W, F>>,
) -> anyhow::Result<()> {
    let reflection = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(mimir_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("failed to build reflection service");
    tracing::info!(%addr, "replication gRPC server starting");
    tonic::transport::Server::builder()
        .add_service(LogReplicationServer::new(ReplicationServiceImpl::new(registry)))
        .add_service(reflection)
        .serve(addr)
        .await
        .map_err(Into::into)
}
