use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid path component: {0}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
