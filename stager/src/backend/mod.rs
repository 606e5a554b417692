//! Regional storage collaborators.
//!
//! The core never speaks a wire protocol. Every region exposes a blob store
//! (artifacts and metadata) and a parameter store (pointers, bucket names and
//! the organisation configuration). Calls return [`BackendResult`], a tagged
//! result that keeps "not found" and "permission denied" apart from every
//! other failure so callers can apply the right policy to each.

mod filesystem;
mod memory;

pub use filesystem::FilesystemBackend;
pub use memory::{Call, MemoryBackend};

use async_trait::async_trait;
use bytes::Bytes;

/// Outcome of a single backend call.
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found")]
    NotFound,

    #[error("access denied")]
    PermissionDenied,

    #[error("{0}")]
    Other(String),
}

/// Object storage in one region.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn region(&self) -> &str;

    /// Succeeds if the object exists.
    async fn head(&self, bucket: &str, key: &str) -> BackendResult<()>;

    async fn get(&self, bucket: &str, key: &str) -> BackendResult<Bytes>;

    /// Writes `body`. The store rejects the write if `content_md5` (base64
    /// MD5) does not match the body.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_md5: &str)
    -> BackendResult<()>;
}

/// Key/value parameter storage in one region.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    fn region(&self) -> &str;

    /// Resource identifier for `name`, quoted in permission errors.
    fn arn(&self, name: &str) -> String;

    async fn get(&self, name: &str) -> BackendResult<String>;

    /// Creates or overwrites the parameter.
    async fn put(&self, name: &str, value: &str) -> BackendResult<()>;

    async fn delete(&self, name: &str) -> BackendResult<()>;
}

/// Builds per-region store handles.
///
/// Handles are cheap and never pooled: each regional worker asks for its own.
pub trait Backend: Send + Sync + 'static {
    fn blob_store(&self, region: &str) -> Box<dyn BlobStore>;
    fn parameter_store(&self, region: &str) -> Box<dyn ParameterStore>;
}

/// Builds the ARN of a Systems Manager parameter.
pub fn make_parameter_arn(region: &str, account_id: &str, name: &str) -> String {
    let name = name.strip_prefix('/').unwrap_or(name);
    format!("arn:aws:ssm:{region}:{account_id}:parameter/{name}")
}
