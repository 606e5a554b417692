//! Read path: resolves one answer from regions that may disagree or be down.
//!
//! Regions are interrogated one at a time, in the order given. The latest
//! version needs a quorum of successful answers and the highest one wins.
//! Configuration, metadata and artifact bytes are expected to be identical
//! everywhere, so the first region that answers wins. Every loader memoises
//! its answer and never asks again.

use crate::artifacts::{Metadata, decode_metadata, parse_version};
use crate::backend::{Backend, BackendError};
use crate::configuration::Configuration;
use crate::errors::{Result, StagerError};
use crate::metrics_defs::{RESOLVER_INTERROGATIONS, RESOLVER_REGION_FAILURE};
use crate::progress::Progress;
use crate::worker::{Output, RegionOperation, RegionWorker};
use bytes::Bytes;
use semver::Version;
use shared::counter;
use std::path::Path;
use tokio::sync::OnceCell;

/// Successful answers needed before the latest version is decided.
///
/// 0→0, 1→1, 2→1, 3→2, 4→2, 5→3.
pub fn successes_required(regions: usize) -> usize {
    regions.div_ceil(2)
}

fn interrogated(value: &'static str) {
    counter!(RESOLVER_INTERROGATIONS, "value" => value).increment(1);
}

fn region_failed(value: &'static str, region: &str, err: &StagerError) {
    tracing::warn!(region = %region, value, error = %err, "Skipping region");
    counter!(RESOLVER_REGION_FAILURE, "value" => value).increment(1);
}

fn no_regions(regions: &[String]) -> StagerError {
    StagerError::NoRegionsAvailable {
        regions: regions.to_vec(),
    }
}

fn unexpected(region: &str) -> StagerError {
    StagerError::TaskFailed {
        region: region.to_string(),
        message: "unexpected output".into(),
    }
}

/// Resolves a project's latest version by quorum.
pub struct LatestVersionLoader<'a> {
    backend: &'a dyn Backend,
    regions: &'a [String],
    project: String,
    parameter_name: String,
    version: OnceCell<Version>,
}

impl<'a> LatestVersionLoader<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        regions: &'a [String],
        configuration: &Configuration,
        project: &str,
    ) -> Self {
        LatestVersionLoader {
            backend,
            regions,
            project: project.to_string(),
            parameter_name: configuration.latest_version_parameter_name(project),
            version: OnceCell::new(),
        }
    }

    pub async fn version(&self) -> Result<&Version> {
        self.version.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<Version> {
        let required = successes_required(self.regions.len()).max(1);
        let mut versions = Vec::with_capacity(required);

        for region in self.regions {
            if versions.len() >= required {
                break;
            }

            interrogated("latest_version");
            match self.claim(region).await {
                Ok(version) => {
                    tracing::debug!(
                        region = %region,
                        project = %self.project,
                        version = %version,
                        "Region claims latest version"
                    );
                    versions.push(version);
                }
                Err(err) => region_failed("latest_version", region, &err),
            }
        }

        if versions.len() < required {
            return Err(no_regions(self.regions));
        }

        versions.into_iter().max().ok_or_else(|| no_regions(self.regions))
    }

    async fn claim(&self, region: &str) -> Result<Version> {
        let worker = RegionWorker::new(self.backend, region);
        let operation = RegionOperation::GetPointer {
            name: self.parameter_name.clone(),
        };
        match worker.perform(&operation).await? {
            Output::Value(raw) => parse_version(&raw),
            _ => Err(unexpected(region)),
        }
    }
}

/// Loads the organisation configuration from the first region that answers.
pub struct ConfigurationLoader<'a> {
    backend: &'a dyn Backend,
    regions: &'a [String],
    parameter_name: String,
    configuration: OnceCell<Configuration>,
}

impl<'a> ConfigurationLoader<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        regions: &'a [String],
        parameter_name: impl Into<String>,
    ) -> Self {
        ConfigurationLoader {
            backend,
            regions,
            parameter_name: parameter_name.into(),
            configuration: OnceCell::new(),
        }
    }

    /// The defaulted configuration.
    ///
    /// When no region answers, a permission or parse error from any region is
    /// returned in preference to the generic unavailability error, since
    /// retrying will not fix it.
    pub async fn loaded(&self) -> Result<&Configuration> {
        self.configuration.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<Configuration> {
        let mut hard_error = None;

        for region in self.regions {
            interrogated("configuration");
            match self.load(region).await {
                Ok(configuration) => {
                    tracing::debug!(region = %region, "Configuration loaded");
                    return Ok(configuration);
                }
                Err(err) => {
                    region_failed("configuration", region, &err);
                    if hard_error.is_none()
                        && (err.is_permission_denied()
                            || matches!(err, StagerError::InvalidConfiguration(_)))
                    {
                        hard_error = Some(err);
                    }
                }
            }
        }

        Err(hard_error.unwrap_or_else(|| no_regions(self.regions)))
    }

    async fn load(&self, region: &str) -> Result<Configuration> {
        let worker = RegionWorker::new(self.backend, region);
        let operation = RegionOperation::GetConfig {
            name: self.parameter_name.clone(),
        };
        match worker.perform(&operation).await? {
            Output::Value(raw) => Configuration::from_json(&raw, region),
            _ => Err(unexpected(region)),
        }
    }
}

/// Loads an artifact's metadata from the first region that has it.
pub struct MetadataLoader<'a> {
    backend: &'a dyn Backend,
    regions: &'a [String],
    bucket_param_name: String,
    key: String,
    metadata: OnceCell<Metadata>,
}

impl<'a> MetadataLoader<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        regions: &'a [String],
        bucket_param_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        MetadataLoader {
            backend,
            regions,
            bucket_param_name: bucket_param_name.into(),
            key: key.into(),
            metadata: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The metadata, or empty metadata if a region explicitly has none.
    ///
    /// Only a missing metadata object counts as such a claim. A region that
    /// cannot even name its bucket has failed. Fails only when every region
    /// failed and none of them claimed the artifact has no metadata.
    pub async fn loaded(&self) -> Result<&Metadata> {
        self.metadata.get_or_try_init(|| self.resolve()).await
    }

    async fn resolve(&self) -> Result<Metadata> {
        let mut any_claim_none = false;

        for region in self.regions {
            interrogated("metadata");
            match self.load(region).await {
                Ok(metadata) => return Ok(metadata),
                Err(StagerError::Backend {
                    source: BackendError::NotFound,
                    ..
                }) => {
                    tracing::debug!(region = %region, "Region claims no metadata");
                    any_claim_none = true;
                }
                Err(err) => region_failed("metadata", region, &err),
            }
        }

        if !any_claim_none {
            return Err(no_regions(self.regions));
        }

        tracing::debug!("No metadata found; one or more regions claimed there is none");
        Ok(Metadata::new())
    }

    async fn load(&self, region: &str) -> Result<Metadata> {
        let worker =
            RegionWorker::new(self.backend, region).with_bucket_param_name(&self.bucket_param_name);
        let operation = RegionOperation::GetObject {
            key: self.key.clone(),
        };
        match worker.perform(&operation).await? {
            Output::Object(body) => decode_metadata(&body),
            _ => Err(unexpected(region)),
        }
    }
}

/// Downloads artifact bytes from the first region that serves them.
pub struct ArtifactDownloader<'a> {
    backend: &'a dyn Backend,
    regions: &'a [String],
    progress: &'a dyn Progress,
    bucket_param_name: String,
}

impl<'a> ArtifactDownloader<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        regions: &'a [String],
        progress: &'a dyn Progress,
        bucket_param_name: impl Into<String>,
    ) -> Self {
        ArtifactDownloader {
            backend,
            regions,
            progress,
            bucket_param_name: bucket_param_name.into(),
        }
    }

    /// Fetches `key`, returning the bytes and the region that served them.
    pub async fn fetch(&self, key: &str) -> Result<(String, Bytes)> {
        for region in self.regions {
            interrogated("artifact");
            let worker = RegionWorker::new(self.backend, region)
                .with_bucket_param_name(&self.bucket_param_name);
            let operation = RegionOperation::GetObject {
                key: key.to_string(),
            };
            match worker.perform(&operation).await {
                Ok(Output::Object(body)) => return Ok((region.clone(), body)),
                Ok(_) => region_failed("artifact", region, &unexpected(region)),
                Err(err) => region_failed("artifact", region, &err),
            }
        }

        Err(no_regions(self.regions))
    }

    /// Downloads `key` to `path`.
    pub async fn download(
        &self,
        key: &str,
        project: &str,
        version: &Version,
        path: &Path,
    ) -> Result<()> {
        let (region, body) = self.fetch(key).await?;
        tokio::fs::write(path, &body).await?;
        self.progress.line(&format!(
            "🧁 Downloaded {project} v{version} from {region} to {}.",
            path.display()
        ));
        Ok(())
    }
}
