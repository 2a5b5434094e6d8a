use std::time::Duration;

/// Typed failures surfaced by the failure table subsystem.
///
/// Mirrors how `librqbit::error::Error` is built: a `thiserror` enum for the cases
/// callers are expected to match on, leaving transient internal glue to `anyhow`.
#[derive(thiserror::Error, Debug)]
pub enum FailureTableError {
    #[error("peer disconnected")]
    PeerDisconnected,

    #[error("datastore miss for requested key")]
    DatastoreMiss,

    #[error("timed out waiting for transfer to complete after {0:?}")]
    TransferTimeout(Duration),

    #[error("bug: offer iterator used without acknowledging the previous offer")]
    IllegalState,

    #[error("bug: uid {0} released more than once")]
    DoubleUidRelease(u64),
}

pub type Result<T> = core::result::Result<T, FailureTableError>;
