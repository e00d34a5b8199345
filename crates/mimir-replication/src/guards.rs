use mimir_types::{MimirError, Status};

/// Succeeds iff the request's epoch is strictly later than the current one.
/// Fence requires this: only a genuinely newer leader may fence.
pub fn check_epoch_later(observed: u64, current: u64) -> Result<(), MimirError> {
    if observed <= current {
        return Err(MimirError::InvalidEpoch { observed, current });
    }
    Ok(())
}

/// Succeeds iff the request's epoch matches the current one. Truncate
/// requires this, pairing each truncation with the fence that admitted the
/// same leader; a mismatch means a competing election intervened.
pub fn check_epoch_equal(observed: u64, current: u64) -> Result<(), MimirError> {
    if observed != current {
        return Err(MimirError::InvalidEpoch { observed, current });
    }
    Ok(())
}

pub fn check_status(expected: Status, actual: Status) -> Result<(), MimirError> {
    if actual != expected {
        return Err(MimirError::InvalidStatus { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_later_requires_strict_increase() {
        assert!(check_epoch_later(5, 4).is_ok());
        assert!(matches!(
            check_epoch_later(4, 4),
            Err(MimirError::InvalidEpoch { observed: 4, current: 4 })
        ));
        assert!(matches!(
            check_epoch_later(3, 4),
            Err(MimirError::InvalidEpoch { observed: 3, current: 4 })
        ));
    }

    #[test]
    fn epoch_equal_requires_exact_match() {
        assert!(check_epoch_equal(7, 7).is_ok());
        assert!(check_epoch_equal(6, 7).is_err());
        assert!(check_epoch_equal(8, 7).is_err());
    }

    #[test]
    fn status_must_match() {
        assert!(check_status(Status::Fenced, Status::Fenced).is_ok());
        assert!(matches!(
            check_status(Status::Fenced, Status::NotMember),
            Err(MimirError::InvalidStatus { expected: Status::Fenced, actual: Status::NotMember })
        ));
    }
}
