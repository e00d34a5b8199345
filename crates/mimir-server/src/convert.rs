use mimir_proto::v1 as pb;
use mimir_types::{
    AddEntryRequest, AddEntryResponse, EntryId, FenceRequest, FenceResponse, LogEntry, MimirError,
    TruncateRequest, TruncateResponse,
};
use tonic::Status;

pub fn entry_id_from_proto(id: pb::EntryId) -> EntryId {
    EntryId::new(id.epoch, id.offset)
}

pub fn entry_id_to_proto(id: EntryId) -> pb::EntryId {
    pb::EntryId { epoch: id.epoch, offset: id.offset }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T, MimirError> {
    field.ok_or_else(|| MimirError::ProtocolViolation(format!("missing field {name}")))
}

pub fn fence_request_from_proto(req: pb::FenceRequest) -> FenceRequest {
    FenceRequest { epoch: req.epoch }
}

pub fn fence_response_to_proto(res: FenceResponse) -> pb::FenceResponse {
    pb::FenceResponse { epoch: res.epoch, head_index: Some(entry_id_to_proto(res.head_index)) }
}

pub fn truncate_request_from_proto(req: pb::TruncateRequest) -> Result<TruncateRequest, MimirError> {
    Ok(TruncateRequest {
        epoch: req.epoch,
        head_index: entry_id_from_proto(required(req.head_index, "head_index")?),
    })
}

pub fn truncate_response_to_proto(res: TruncateResponse) -> pb::TruncateResponse {
    pb::TruncateResponse { epoch: res.epoch, head_index: Some(entry_id_to_proto(res.head_index)) }
}

pub fn add_entry_request_from_proto(req: pb::AddEntryRequest) -> Result<AddEntryRequest, MimirError> {
    let entry = required(req.entry, "entry")?;
    Ok(AddEntryRequest {
        epoch: req.epoch,
        entry: LogEntry {
            entry_id: entry_id_from_proto(required(entry.entry_id, "entry.entry_id")?),
            value: entry.value,
        },
        commit_index: entry_id_from_proto(required(req.commit_index, "commit_index")?),
    })
}

pub fn add_entry_response_to_proto(res: AddEntryResponse) -> pb::AddEntryResponse {
    pb::AddEntryResponse {
        epoch: res.epoch,
        entry_id: res.entry_id.map(entry_id_to_proto),
        invalid_epoch: res.invalid_epoch,
    }
}

pub fn mimir_to_status(err: MimirError) -> Status {
    match &err {
        MimirError::InvalidEpoch { .. } | MimirError::InvalidStatus { .. } => {
            Status::failed_precondition(err.to_string())
        }
        MimirError::ProtocolViolation(_) => Status::invalid_argument(err.to_string()),
        MimirError::Closed => Status::unavailable(err.to_string()),
        MimirError::Storage(_) | MimirError::Codec(_) => Status::internal(err.to_string()),
        MimirError::Transport(_) => Status::aborted(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_round_trips() {
        let id = EntryId::new(3, 9);
        assert_eq!(entry_id_from_proto(entry_id_to_proto(id)), id);
    }

    #[test]
    fn truncate_request_requires_head_index() {
        let req = pb::TruncateRequest { shard_id: 0, epoch: 2, head_index: None };
        assert!(matches!(
            truncate_request_from_proto(req),
            Err(MimirError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn add_entry_request_requires_entry_and_commit() {
        let entry = pb::LogEntry {
            entry_id: Some(pb::EntryId { epoch: 1, offset: 0 }),
            value: b"batch".to_vec(),
        };

        let missing_entry = pb::AddEntryRequest {
            shard_id: 0,
            epoch: 1,
            entry: None,
            commit_index: Some(pb::EntryId { epoch: 0, offset: 0 }),
        };
        assert!(add_entry_request_from_proto(missing_entry).is_err());

        let missing_commit = pb::AddEntryRequest {
            shard_id: 0,
            epoch: 1,
            entry: Some(entry.clone()),
            commit_index: None,
        };
        assert!(add_entry_request_from_proto(missing_commit).is_err());

        let ok = pb::AddEntryRequest {
            shard_id: 0,
            epoch: 1,
            entry: Some(entry),
            commit_index: Some(pb::EntryId { epoch: 0, offset: 0 }),
        };
        let domain = add_entry_request_from_proto(ok).unwrap();
        assert_eq!(domain.entry.entry_id, EntryId::new(1, 0));
        assert_eq!(domain.entry.value, b"batch");
        assert_eq!(domain.commit_index, EntryId::zero());
    }

    #[test]
    fn rejection_response_carries_no_entry_id() {
        let res = add_entry_response_to_proto(AddEntryResponse {
            epoch: 4,
            entry_id: None,
            invalid_epoch: true,
        });
        assert_eq!(res.epoch, 4);
        assert!(res.entry_id.is_none());
        assert!(res.invalid_epoch);
    }

    #[test]
    fn error_codes_by_severity() {
        use mimir_types::Status as FollowerStatus;

        let s = mimir_to_status(MimirError::InvalidEpoch { observed: 1, current: 2 });
        assert_eq!(s.code(), tonic::Code::FailedPrecondition);

        let s = mimir_to_status(MimirError::InvalidStatus {
            expected: FollowerStatus::Fenced,
            actual: FollowerStatus::NotMember,
        });
        assert_eq!(s.code(), tonic::Code::FailedPrecondition);

        let s = mimir_to_status(MimirError::ProtocolViolation("x".into()));
        assert_eq!(s.code(), tonic::Code::InvalidArgument);

        let s = mimir_to_status(MimirError::Closed);
        assert_eq!(s.code(), tonic::Code::Unavailable);

        let s = mimir_to_status(MimirError::Storage("disk".into()));
        assert_eq!(s.code(), tonic::Code::Internal);
    }
}
