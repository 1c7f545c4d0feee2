use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown pairing code")]
    InvalidCode,

    #[error("session already has two participants")]
    SessionFull,

    #[error("caller is not a member of this session")]
    NotMember,

    #[error("caller is not currently connected")]
    NotConnected,

    #[error("maximum active sessions reached")]
    RateLimited,

    #[error("pairing code allocation failed: {0}")]
    CodeAllocation(#[from] crate::pairing::PairingError),

    #[error("storage quota exceeded: {current}/{limit} bytes")]
    QuotaExceeded { current: u64, limit: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

pub type SessionResult<T> = Result<T, SessionError>;
