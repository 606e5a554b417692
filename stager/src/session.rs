//! The per-invocation context.
//!
//! A `Session` is built once per invocation and passed by reference. It
//! holds the backend, the environment it was started with and the regions to
//! work in, and memoises the organisation configuration for its lifetime.

use crate::artifacts::{ArtifactKey, Metadata, VersionSpec, validate_project_name};
use crate::backend::Backend;
use crate::config::Environment;
use crate::configuration::Configuration;
use crate::errors::Result;
use crate::fanout::{DEFAULT_CONCURRENCY, DEFAULT_POLL_INTERVAL, FanOut};
use crate::progress::{Progress, StdoutProgress};
use crate::replication::{ConfigurationSaver, ReplicationReport};
use crate::resolver::{ArtifactDownloader, ConfigurationLoader, LatestVersionLoader, MetadataLoader};
use crate::stager::Stager;
use bytes::Bytes;
use semver::Version;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub struct Session {
    backend: Arc<dyn Backend>,
    environment: Environment,
    regions: Vec<String>,
    read_only: bool,
    concurrency: usize,
    poll_interval: Duration,
    progress: Arc<dyn Progress>,
    stored_configuration: OnceCell<Configuration>,
    configuration: OnceCell<Configuration>,
}

impl Session {
    /// Creates a session working in the regions named by the environment.
    pub fn new(backend: Arc<dyn Backend>, environment: Environment) -> Result<Self> {
        let regions = environment.regions()?;
        Ok(Session {
            backend,
            environment,
            regions,
            read_only: false,
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: Arc::new(StdoutProgress),
            stored_configuration: OnceCell::new(),
            configuration: OnceCell::new(),
        })
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    /// A read-only session performs every read but skips every write.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn validate_project_name(&self, name: &str) -> Result<()> {
        validate_project_name(name)
    }

    fn fanout(&self) -> FanOut {
        FanOut::new(self.concurrency).with_poll_interval(self.poll_interval)
    }

    /// The configuration as stored, without environment overrides.
    pub async fn stored_configuration(&self) -> Result<&Configuration> {
        self.stored_configuration
            .get_or_try_init(|| async {
                let loader = ConfigurationLoader::new(
                    self.backend.as_ref(),
                    &self.regions,
                    self.environment.configuration_parameter_name(),
                );
                loader.loaded().await.cloned()
            })
            .await
    }

    /// The configuration with environment overrides applied.
    pub async fn configuration(&self) -> Result<&Configuration> {
        self.configuration
            .get_or_try_init(|| async {
                let mut configuration = self.stored_configuration().await?.clone();
                configuration.apply_overrides(&self.environment.overrides());
                Ok(configuration)
            })
            .await
    }

    /// Stages `body` as `project` at `version` in every region.
    pub async fn stage(
        &self,
        project: &str,
        version: Version,
        body: Bytes,
        metadata: &Metadata,
    ) -> Result<()> {
        let artifact = ArtifactKey::new(project, version)?;
        let configuration = self.configuration().await?;

        let stager = Stager::new(
            self.backend.as_ref(),
            configuration,
            self.fanout(),
            self.progress.as_ref(),
            self.read_only,
        );
        stager
            .stage(&self.regions, &artifact, body, metadata)
            .await?
            .into_result(&self.regions)
    }

    pub async fn stage_file(
        &self,
        project: &str,
        version: Version,
        path: &Path,
        metadata: &Metadata,
    ) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        self.stage(project, version, Bytes::from(body), metadata)
            .await
    }

    /// Gets a handle to a staged artifact. The latest version is resolved
    /// lazily, on first use.
    pub async fn get(&self, project: &str, version: VersionSpec) -> Result<Artifact<'_>> {
        validate_project_name(project)?;
        let configuration = self.configuration().await?;
        configuration.require_bucket_param_name()?;

        Ok(Artifact {
            session: self,
            configuration,
            project: project.to_string(),
            requested: version,
            latest: LatestVersionLoader::new(
                self.backend.as_ref(),
                &self.regions,
                configuration,
                project,
            ),
            metadata: OnceCell::new(),
        })
    }

    pub async fn latest_version(&self, project: &str) -> Result<Version> {
        validate_project_name(project)?;
        let configuration = self.configuration().await?;
        let loader = LatestVersionLoader::new(
            self.backend.as_ref(),
            &self.regions,
            configuration,
            project,
        );
        loader.version().await.cloned()
    }

    /// Saves `configuration` to the regions it names (or this session's
    /// regions if it names none) and deletes it from `delete_regions`.
    ///
    /// The configuration this session already resolved stays memoised, so
    /// it keeps answering with the document it read before the save. Open a
    /// new session to read the saved one.
    pub async fn save_configuration(
        &self,
        configuration: &Configuration,
        delete_regions: &[String],
    ) -> Result<ReplicationReport> {
        let mut save_regions = configuration.region_list();
        if save_regions.is_empty() {
            save_regions = self.regions.clone();
        }

        let saver = ConfigurationSaver::new(
            self.backend.as_ref(),
            self.fanout(),
            self.progress.as_ref(),
            self.environment.configuration_parameter_name(),
            self.read_only,
        );
        saver
            .save(configuration, &save_regions, delete_regions)
            .await
    }
}

/// A staged artifact.
pub struct Artifact<'s> {
    session: &'s Session,
    configuration: &'s Configuration,
    project: String,
    requested: VersionSpec,
    latest: LatestVersionLoader<'s>,
    metadata: OnceCell<Metadata>,
}

impl Artifact<'_> {
    pub fn project(&self) -> &str {
        &self.project
    }

    pub async fn version(&self) -> Result<&Version> {
        match &self.requested {
            VersionSpec::Exact(version) => Ok(version),
            VersionSpec::Latest => self.latest.version().await,
        }
    }

    async fn key(&self) -> Result<ArtifactKey> {
        ArtifactKey::new(self.project.clone(), self.version().await?.clone())
    }

    pub async fn metadata(&self) -> Result<&Metadata> {
        self.metadata
            .get_or_try_init(|| async {
                let key = self.configuration.metadata_key(&self.key().await?);
                let loader = MetadataLoader::new(
                    self.session.backend.as_ref(),
                    &self.session.regions,
                    self.bucket_param_name()?,
                    key,
                );
                loader.loaded().await.cloned()
            })
            .await
    }

    pub async fn download(&self, path: &Path) -> Result<()> {
        let artifact = self.key().await?;
        let downloader = ArtifactDownloader::new(
            self.session.backend.as_ref(),
            &self.session.regions,
            self.session.progress.as_ref(),
            self.bucket_param_name()?,
        );
        downloader
            .download(
                &self.configuration.artifact_key(&artifact),
                artifact.project(),
                artifact.version(),
                path,
            )
            .await
    }

    fn bucket_param_name(&self) -> Result<&str> {
        self.configuration.require_bucket_param_name()
    }
}

impl std::fmt::Debug for Artifact<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("project", &self.project)
            .field("requested", &self.requested)
            .finish()
    }
}
