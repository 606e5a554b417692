//! Stages one artifact in as many regions as possible.

use crate::artifacts::{ArtifactKey, Metadata, encode_metadata};
use crate::backend::Backend;
use crate::configuration::Configuration;
use crate::errors::{Result, StagerError};
use crate::fanout::{FanOut, Job, all_ok};
use crate::hash::b64_md5;
use crate::outcome::{OperationKind, RegionOutcome};
use crate::progress::Progress;
use crate::worker::{RegionOperation, RegionWorker};
use bytes::Bytes;

/// Per-region outcomes of one stage.
#[derive(Debug)]
pub struct StageReport {
    pub outcomes: Vec<RegionOutcome>,
}

impl StageReport {
    /// True when every dispatched region succeeded.
    pub fn all_ok(&self) -> bool {
        all_ok(&self.outcomes)
    }

    pub fn failed_regions(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.region.clone())
            .collect()
    }

    /// Collapses the report into the caller-facing result.
    ///
    /// An already-staged refusal from any region wins over every other
    /// failure and is returned unchanged.
    pub fn into_result(self, regions: &[String]) -> Result<()> {
        if self.outcomes.is_empty() {
            return Err(StagerError::NoRegionsAvailable {
                regions: regions.to_vec(),
            });
        }

        let failed = self.failed_regions();
        let succeeded = self.outcomes.len() - failed.len();

        if let Some(exists) = self
            .outcomes
            .into_iter()
            .filter_map(|o| o.error)
            .find(StagerError::is_already_staged)
        {
            return Err(exists);
        }

        match (succeeded, failed.is_empty()) {
            (_, true) => Ok(()),
            (0, false) => Err(StagerError::CannotStage),
            (_, false) => Err(StagerError::NotAllRegionsSucceeded { failed }),
        }
    }
}

pub struct Stager<'a> {
    backend: &'a dyn Backend,
    configuration: &'a Configuration,
    fanout: FanOut,
    progress: &'a dyn Progress,
    read_only: bool,
}

impl<'a> Stager<'a> {
    pub fn new(
        backend: &'a dyn Backend,
        configuration: &'a Configuration,
        fanout: FanOut,
        progress: &'a dyn Progress,
        read_only: bool,
    ) -> Self {
        Stager {
            backend,
            configuration,
            fanout,
            progress,
            read_only,
        }
    }

    /// Uploads the artifact and its metadata, then commits the latest version
    /// pointer, in every region. Each region's steps run in order; regions run
    /// concurrently.
    pub async fn stage(
        &self,
        regions: &[String],
        artifact: &ArtifactKey,
        body: Bytes,
        metadata: &Metadata,
    ) -> Result<StageReport> {
        let bucket_param_name = self.configuration.require_bucket_param_name()?;
        let operations = self.operations(artifact, body, metadata)?;

        tracing::info!(
            artifact = %artifact,
            regions = ?regions,
            read_only = self.read_only,
            "Staging"
        );

        let jobs = regions
            .iter()
            .map(|region| Job {
                worker: RegionWorker::new(self.backend, region)
                    .with_bucket_param_name(bucket_param_name)
                    .with_read_only(self.read_only),
                kind: OperationKind::Stage,
                operations: operations.clone(),
            })
            .collect();

        let outcomes = self
            .fanout
            .run(jobs, |outcome| self.report(outcome))
            .await;

        Ok(StageReport { outcomes })
    }

    fn operations(
        &self,
        artifact: &ArtifactKey,
        body: Bytes,
        metadata: &Metadata,
    ) -> Result<Vec<RegionOperation>> {
        let mut operations = vec![RegionOperation::UploadArtifact {
            artifact: artifact.clone(),
            key: self.configuration.artifact_key(artifact),
            content_md5: b64_md5(&body),
            body,
        }];

        if let Some(body) = encode_metadata(metadata)? {
            operations.push(RegionOperation::UploadMetadata {
                key: self.configuration.metadata_key(artifact),
                content_md5: b64_md5(&body),
                body,
            });
        }

        operations.push(RegionOperation::SetPointer {
            name: self
                .configuration
                .latest_version_parameter_name(artifact.project()),
            version: artifact.version().to_string(),
        });

        Ok(operations)
    }

    fn report(&self, outcome: &RegionOutcome) {
        let line = match &outcome.error {
            None if self.read_only => format!("🧁 Staged (not really) to {}.", outcome.region),
            None => format!("🧁 Staged to {}.", outcome.region),
            Some(err) => format!("🔥 Failed to stage to {}: {err}", outcome.region),
        };
        self.progress.line(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, Call, MemoryBackend};
    use crate::progress::BufferProgress;
    use semver::Version;
    use std::time::Duration;

    fn seeded(regions: &[&str]) -> MemoryBackend {
        let backend = MemoryBackend::new();
        for region in regions {
            backend.set_parameter(region, "/bucket-name", &format!("bucket-{region}"));
        }
        backend
    }

    fn configuration() -> Configuration {
        Configuration {
            bucket_param_name: "/bucket-name".into(),
            bucket_key_prefix: "builds/".into(),
            ..Configuration::empty("r1")
        }
    }

    fn regions(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    fn fanout() -> FanOut {
        FanOut::default().with_poll_interval(Duration::from_millis(10))
    }

    fn demo() -> ArtifactKey {
        ArtifactKey::new("demo", Version::new(1, 0, 0)).unwrap()
    }

    #[tokio::test]
    async fn test_stage_writes_everything_everywhere() {
        let backend = seeded(&["r1", "r2"]);
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        let mut metadata = Metadata::new();
        metadata.insert("lang".into(), "rust".into());
        let report = stager
            .stage(&regions(&["r1", "r2"]), &demo(), Bytes::from_static(b"data"), &metadata)
            .await
            .unwrap();

        assert!(report.all_ok());
        for region in ["r1", "r2"] {
            let bucket = format!("bucket-{region}");
            assert_eq!(
                backend.object(region, &bucket, "builds/demo@1.0.0").unwrap(),
                Bytes::from_static(b"data")
            );
            assert!(backend.object(region, &bucket, "builds/demo@1.0.0/metadata").is_some());
            assert_eq!(backend.parameter(region, "/demo/latest").unwrap(), "1.0.0");
        }

        let mut lines = progress.lines();
        lines.sort();
        assert_eq!(lines, vec!["🧁 Staged to r1.", "🧁 Staged to r2."]);
        report.into_result(&regions(&["r1", "r2"])).unwrap();
    }

    #[tokio::test]
    async fn test_empty_metadata_is_not_uploaded() {
        let backend = seeded(&["r1"]);
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        stager
            .stage(&regions(&["r1"]), &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap();

        assert_eq!(backend.calls("r1", Call::PutObject), 1);
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let backend = seeded(&["r1", "r2", "r3"]);
        backend.fail_region("r2", BackendError::Other("unreachable".into()));
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        let all = regions(&["r1", "r2", "r3"]);
        let report = stager
            .stage(&all, &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap();

        assert!(!report.all_ok());
        assert!(
            progress
                .lines()
                .contains(&"🔥 Failed to stage to r2: r2: unreachable".to_string())
        );
        assert!(matches!(
            report.into_result(&all),
            Err(StagerError::NotAllRegionsSucceeded { failed }) if failed == vec!["r2"]
        ));
    }

    #[tokio::test]
    async fn test_total_failure() {
        let backend = seeded(&["r1", "r2"]);
        backend.fail("r1", Call::PutObject, BackendError::Other("no".into()));
        backend.fail("r2", Call::PutObject, BackendError::Other("no".into()));
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        let all = regions(&["r1", "r2"]);
        let report = stager
            .stage(&all, &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap();
        assert!(matches!(report.into_result(&all), Err(StagerError::CannotStage)));
    }

    #[tokio::test]
    async fn test_already_staged_reaches_caller_unchanged() {
        let backend = seeded(&["r1", "r2"]);
        backend.set_object("r2", "bucket-r2", "builds/demo@1.0.0", "old");
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        let all = regions(&["r1", "r2"]);
        let report = stager
            .stage(&all, &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap();

        let err = report.into_result(&all).unwrap_err();
        assert_eq!(err.to_string(), "demo 1.0.0 is already staged.");
        assert_eq!(backend.calls("r2", Call::PutObject), 0);
    }

    #[tokio::test]
    async fn test_read_only() {
        let backend = seeded(&["r1"]);
        let configuration = configuration();
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, true);

        let report = stager
            .stage(&regions(&["r1"]), &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap();

        assert!(report.all_ok());
        assert_eq!(progress.lines(), vec!["🧁 Staged (not really) to r1."]);
        assert_eq!(backend.total_calls(Call::PutObject), 0);
        assert_eq!(backend.total_calls(Call::PutParameter), 0);
    }

    #[tokio::test]
    async fn test_requires_bucket_param_name() {
        let backend = seeded(&["r1"]);
        let configuration = Configuration::empty("r1");
        let progress = BufferProgress::new();
        let stager = Stager::new(&backend, &configuration, fanout(), &progress, false);

        let err = stager
            .stage(&regions(&["r1"]), &demo(), Bytes::from_static(b"data"), &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StagerError::NoConfiguration { .. }));
        assert_eq!(backend.total_calls(Call::HeadObject), 0);
    }

    #[test]
    fn test_no_regions() {
        let report = StageReport {
            outcomes: Vec::new(),
        };
        assert!(report.all_ok());
        assert!(matches!(
            report.into_result(&[]),
            Err(StagerError::NoRegionsAvailable { .. })
        ));
    }
}
