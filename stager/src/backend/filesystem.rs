//! Regional stores backed by a local directory tree.
//!
//! Each region is a directory under the base dir:
//!
//! ```text
//! <base>/<region>/objects/<bucket>/<encoded key>
//! <base>/<region>/parameters/<encoded name>
//! ```
//!
//! Keys and parameter names are flattened into single file names so that an
//! artifact key and its `/metadata` sibling can coexist.

use super::{Backend, BackendError, BackendResult, BlobStore, ParameterStore};
use crate::hash::b64_md5;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};

pub struct FilesystemBackend {
    base_dir: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilesystemBackend {
            base_dir: base_dir.into(),
        }
    }
}

impl Backend for FilesystemBackend {
    fn blob_store(&self, region: &str) -> Box<dyn BlobStore> {
        Box::new(FilesystemStore::new(&self.base_dir, region))
    }

    fn parameter_store(&self, region: &str) -> Box<dyn ParameterStore> {
        Box::new(FilesystemStore::new(&self.base_dir, region))
    }
}

struct FilesystemStore {
    region: String,
    root: PathBuf,
}

impl FilesystemStore {
    fn new(base_dir: &Path, region: &str) -> Self {
        FilesystemStore {
            region: region.to_string(),
            root: base_dir.join(encode(region)),
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root
            .join("objects")
            .join(encode(bucket))
            .join(encode(key))
    }

    fn parameter_path(&self, name: &str) -> PathBuf {
        self.root.join("parameters").join(encode(name))
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    fn region(&self) -> &str {
        &self.region
    }

    async fn head(&self, bucket: &str, key: &str) -> BackendResult<()> {
        tokio::fs::metadata(self.object_path(bucket, key))
            .await
            .map(|_| ())
            .map_err(from_io)
    }

    async fn get(&self, bucket: &str, key: &str) -> BackendResult<Bytes> {
        tokio::fs::read(self.object_path(bucket, key))
            .await
            .map(Bytes::from)
            .map_err(from_io)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_md5: &str,
    ) -> BackendResult<()> {
        if b64_md5(&body) != content_md5 {
            return Err(BackendError::Other(format!(
                "Content-MD5 {content_md5} does not match the body"
            )));
        }
        write(&self.object_path(bucket, key), &body).await
    }
}

#[async_trait]
impl ParameterStore for FilesystemStore {
    fn region(&self) -> &str {
        &self.region
    }

    fn arn(&self, name: &str) -> String {
        self.parameter_path(name).display().to_string()
    }

    async fn get(&self, name: &str) -> BackendResult<String> {
        tokio::fs::read_to_string(self.parameter_path(name))
            .await
            .map_err(from_io)
    }

    async fn put(&self, name: &str, value: &str) -> BackendResult<()> {
        write(&self.parameter_path(name), value.as_bytes()).await
    }

    async fn delete(&self, name: &str) -> BackendResult<()> {
        tokio::fs::remove_file(self.parameter_path(name))
            .await
            .map_err(from_io)
    }
}

async fn write(path: &Path, data: &[u8]) -> BackendResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(from_io)?;
    }
    tokio::fs::write(path, data).await.map_err(from_io)
}

fn from_io(err: io::Error) -> BackendError {
    match err.kind() {
        io::ErrorKind::NotFound => BackendError::NotFound,
        io::ErrorKind::PermissionDenied => BackendError::PermissionDenied,
        _ => BackendError::Other(err.to_string()),
    }
}

// Percent-encodes the characters that cannot appear in a single path segment.
fn encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    if out == "." || out == ".." {
        out = out.replace('.', "%2E");
    }
    out
}
