//! The unit of concurrent regional work.
//!
//! A `RegionWorker` owns fresh store handles for one region and performs
//! [`RegionOperation`]s against them, one at a time. Coordinators hand a
//! worker a list of operations via [`RegionWorker::run`]; the worker performs
//! them in order, stops at the first failure and reports exactly one
//! [`RegionOutcome`] through the completion channel.

use crate::artifacts::ArtifactKey;
use crate::backend::{Backend, BackendError, BlobStore, ParameterStore};
use crate::errors::{Result, StagerError};
use crate::metrics_defs::REGION_OPERATION;
use crate::outcome::{OperationKind, RegionOutcome};
use crate::parameters::{as_config_error, delete_parameter, get_parameter, put_parameter};
use crate::prober;
use bytes::Bytes;
use shared::counter;
use tokio::sync::{OnceCell, mpsc};

/// Default document for a configuration parameter that does not exist yet.
pub const EMPTY_DOCUMENT: &str = "{}";

#[derive(Clone, Debug)]
pub enum RegionOperation {
    /// Uploads artifact bytes, refusing if the key is already taken.
    UploadArtifact {
        artifact: ArtifactKey,
        key: String,
        body: Bytes,
        content_md5: String,
    },
    UploadMetadata {
        key: String,
        body: Bytes,
        content_md5: String,
    },
    /// Commits a project's latest version pointer.
    SetPointer { name: String, version: String },
    SaveConfig { name: String, document: String },
    DeleteConfig { name: String },
    GetPointer { name: String },
    /// Reads a configuration document; a missing one reads as `{}`.
    GetConfig { name: String },
    GetObject { key: String },
}

impl RegionOperation {
    fn name(&self) -> &'static str {
        match self {
            RegionOperation::UploadArtifact { .. } => "upload_artifact",
            RegionOperation::UploadMetadata { .. } => "upload_metadata",
            RegionOperation::SetPointer { .. } => "set_pointer",
            RegionOperation::SaveConfig { .. } => "save_config",
            RegionOperation::DeleteConfig { .. } => "delete_config",
            RegionOperation::GetPointer { .. } => "get_pointer",
            RegionOperation::GetConfig { .. } => "get_config",
            RegionOperation::GetObject { .. } => "get_object",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    Written,
    /// A write that was validated but not performed in read-only mode.
    Skipped,
    Value(String),
    Object(Bytes),
}

pub struct RegionWorker {
    region: String,
    blobs: Box<dyn BlobStore>,
    parameters: Box<dyn ParameterStore>,
    bucket_param_name: Option<String>,
    read_only: bool,
    bucket: OnceCell<String>,
}

impl RegionWorker {
    pub fn new(backend: &dyn Backend, region: &str) -> Self {
        RegionWorker {
            region: region.to_string(),
            blobs: backend.blob_store(region),
            parameters: backend.parameter_store(region),
            bucket_param_name: None,
            read_only: false,
            bucket: OnceCell::new(),
        }
    }

    /// Names the parameter holding this region's bucket name. Required for
    /// any object operation.
    pub fn with_bucket_param_name(mut self, name: impl Into<String>) -> Self {
        self.bucket_param_name = Some(name.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// The region's bucket name, read once from its parameter.
    async fn bucket(&self) -> Result<&str> {
        let name = self
            .bucket_param_name
            .as_deref()
            .ok_or_else(|| StagerError::NoConfiguration {
                key: Some("bucket_param_name".into()),
            })?;

        self.bucket
            .get_or_try_init(|| get_parameter(self.parameters.as_ref(), name, None))
            .await
            .map(String::as_str)
    }

    pub async fn perform(&self, operation: &RegionOperation) -> Result<Output> {
        tracing::debug!(
            region = %self.region,
            operation = operation.name(),
            read_only = self.read_only,
            "Performing regional operation"
        );

        match operation {
            RegionOperation::UploadArtifact {
                artifact,
                key,
                body,
                content_md5,
            } => {
                let bucket = self.bucket().await?;
                if prober::exists(self.blobs.as_ref(), bucket, key).await? {
                    return Err(StagerError::ArtifactVersionExists {
                        project: artifact.project().to_string(),
                        version: artifact.version().to_string(),
                    });
                }
                if self.read_only {
                    return Ok(Output::Skipped);
                }
                self.put_object(bucket, key, body, content_md5).await
            }

            RegionOperation::UploadMetadata {
                key,
                body,
                content_md5,
            } => {
                let bucket = self.bucket().await?;
                if self.read_only {
                    return Ok(Output::Skipped);
                }
                self.put_object(bucket, key, body, content_md5).await
            }

            RegionOperation::SetPointer { name, version } => {
                if self.read_only {
                    return Ok(Output::Skipped);
                }
                put_parameter(self.parameters.as_ref(), name, version).await?;
                Ok(Output::Written)
            }

            RegionOperation::SaveConfig { name, document } => {
                if self.read_only {
                    self.read_config(name).await?;
                    return Ok(Output::Skipped);
                }
                put_parameter(self.parameters.as_ref(), name, document)
                    .await
                    .map_err(as_config_error)?;
                Ok(Output::Written)
            }

            RegionOperation::DeleteConfig { name } => {
                if self.read_only {
                    self.read_config(name).await?;
                    return Ok(Output::Skipped);
                }
                delete_parameter(self.parameters.as_ref(), name)
                    .await
                    .map_err(as_config_error)?;
                Ok(Output::Written)
            }

            RegionOperation::GetPointer { name } => {
                let value = get_parameter(self.parameters.as_ref(), name, None).await?;
                Ok(Output::Value(value))
            }

            RegionOperation::GetConfig { name } => {
                self.read_config(name).await.map(Output::Value)
            }

            RegionOperation::GetObject { key } => {
                let bucket = self.bucket().await?;
                self.blobs
                    .get(bucket, key)
                    .await
                    .map(Output::Object)
                    .map_err(|source| self.backend_error(source))
            }
        }
    }

    /// Performs `operations` in order and reports one outcome on `tx`.
    ///
    /// Every failure, including a refused upload of an existing artifact,
    /// ends the sequence and is carried in the outcome.
    pub async fn run(
        self,
        kind: OperationKind,
        operations: Vec<RegionOperation>,
        job: usize,
        tx: mpsc::Sender<(usize, RegionOutcome)>,
    ) {
        let outcome = match self.perform_all(&operations).await {
            Ok(()) => {
                counter!(REGION_OPERATION, "operation" => kind.as_str(), "outcome" => "ok")
                    .increment(1);
                RegionOutcome::ok(self.region, kind)
            }
            Err(err) => {
                tracing::warn!(region = %self.region, %kind, error = %err, "Regional operation failed");
                counter!(REGION_OPERATION, "operation" => kind.as_str(), "outcome" => "error")
                    .increment(1);
                RegionOutcome::failed(self.region, kind, err)
            }
        };

        if tx.send((job, outcome)).await.is_err() {
            tracing::error!("Completion channel closed before outcome was reported");
        }
    }

    async fn perform_all(&self, operations: &[RegionOperation]) -> Result<()> {
        for operation in operations {
            self.perform(operation).await?;
        }
        Ok(())
    }

    async fn read_config(&self, name: &str) -> Result<String> {
        get_parameter(self.parameters.as_ref(), name, Some(EMPTY_DOCUMENT))
            .await
            .map_err(as_config_error)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: &Bytes,
        content_md5: &str,
    ) -> Result<Output> {
        tracing::debug!(region = %self.region, bucket, key, "Uploading object");
        self.blobs
            .put(bucket, key, body.clone(), content_md5)
            .await
            .map_err(|source| self.backend_error(source))?;
        Ok(Output::Written)
    }

    fn backend_error(&self, source: BackendError) -> StagerError {
        StagerError::Backend {
            region: self.region.clone(),
            source,
        }
    }
}
