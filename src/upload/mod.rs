//! Chunked (and single-shot, as a one-chunk case) file upload assembly.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{UploadError, UploadResult};
pub use manager::{UploadConfig, UploadEngine};
pub use types::{UploadProgress, UploadSession};
