/// Generated protobuf/gRPC types for the `mimir.v1` replication protocol.
pub mod v1 {
    tonic::include_proto!("mimir.v1");
}

/// Encoded file descriptor set, registered with the gRPC reflection service.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("descriptor");
