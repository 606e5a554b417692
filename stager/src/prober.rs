use crate::backend::{BackendError, BlobStore};
use crate::errors::{Result, StagerError};

/// Checks whether `key` exists in `bucket` in the store's region.
///
/// Only an explicit not-found answer means absent. Any other failure,
/// permission denied included, is an error: a key the caller cannot see
/// must never be treated as free to overwrite.
pub async fn exists(store: &dyn BlobStore, bucket: &str, key: &str) -> Result<bool> {
    tracing::debug!(region = store.region(), bucket, key, "Checking if object exists");

    match store.head(bucket, key).await {
        Ok(()) => Ok(true),
        Err(BackendError::NotFound) => Ok(false),
        Err(source) => Err(StagerError::Backend {
            region: store.region().to_string(),
            source,
        }),
    }
}
