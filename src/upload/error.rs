use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("unknown upload id")]
    NotFound,

    #[error("chunk index {index} out of range (total {total})")]
    InvalidIndex { index: u32, total: u32 },

    #[error("upload is missing {0} chunk(s)")]
    Incomplete(usize),

    #[error("assembled size {actual} does not match declared size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;
