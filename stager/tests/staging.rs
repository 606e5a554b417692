use bytes::Bytes;
use semver::Version;
use stager::backend::{BackendError, Call, FilesystemBackend, MemoryBackend};
use stager::config::REGIONS_VARIABLE;
use stager::progress::BufferProgress;
use stager::{Environment, Metadata, Session, StagerError, VersionSpec};
use std::sync::Arc;
use std::time::Duration;

const CONFIGURATION: &str = r#"{"bucket_param_name": "/bucket-name"}"#;

fn seeded(regions: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for region in regions {
        backend.set_parameter(region, "/startifact", CONFIGURATION);
        backend.set_parameter(region, "/bucket-name", "artifacts");
    }
    backend
}

fn session(backend: MemoryBackend, regions: &[&str]) -> (Session, Arc<BufferProgress>) {
    let progress = Arc::new(BufferProgress::new());
    let env = Environment::from_vars([(REGIONS_VARIABLE, regions.join(","))]);
    let session = Session::new(Arc::new(backend), env)
        .unwrap()
        .with_poll_interval(Duration::from_millis(10))
        .with_progress(progress.clone());
    (session, progress)
}

#[tokio::test]
async fn test_stage_then_resolve_latest() {
    let backend = seeded(&["r1", "r2"]);
    let (session, _) = session(backend.clone(), &["r1", "r2"]);

    let mut metadata = Metadata::new();
    metadata.insert("commit".into(), "abc123".into());
    session
        .stage("demo", Version::new(1, 0, 0), Bytes::from_static(b"artifact"), &metadata)
        .await
        .unwrap();

    for region in ["r1", "r2"] {
        assert_eq!(
            backend.object(region, "artifacts", "demo@1.0.0").unwrap(),
            Bytes::from_static(b"artifact")
        );
        assert!(backend.object(region, "artifacts", "demo@1.0.0/metadata").is_some());
        assert_eq!(backend.parameter(region, "/demo/latest").unwrap(), "1.0.0");
    }

    assert_eq!(
        session.latest_version("demo").await.unwrap(),
        Version::new(1, 0, 0)
    );
}

#[tokio::test]
async fn test_restaging_is_rejected_without_writing() {
    let backend = seeded(&["r1", "r2"]);
    let (session, _) = session(backend.clone(), &["r1", "r2"]);

    session
        .stage("demo", Version::new(1, 0, 0), Bytes::from_static(b"one"), &Metadata::new())
        .await
        .unwrap();
    let writes = backend.total_calls(Call::PutObject);

    let err = session
        .stage("demo", Version::new(1, 0, 0), Bytes::from_static(b"two"), &Metadata::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StagerError::ArtifactVersionExists { ref project, ref version }
            if project == "demo" && version == "1.0.0"
    ));
    assert_eq!(backend.total_calls(Call::PutObject), writes);
    assert_eq!(
        backend.object("r1", "artifacts", "demo@1.0.0").unwrap(),
        Bytes::from_static(b"one")
    );
}

#[tokio::test]
async fn test_quorum_stops_early() {
    let regions = ["r1", "r2", "r3", "r4", "r5"];
    let backend = seeded(&regions);
    backend.set_parameter("r1", "/demo/latest", "1.0.0");
    backend.set_parameter("r3", "/demo/latest", "0.9.0");
    backend.set_parameter("r4", "/demo/latest", "1.1.0");
    backend.set_parameter("r5", "/demo/latest", "9.0.0");
    let (session, progress) = session(backend.clone(), &regions);

    // Load the configuration first so only pointer reads are counted below.
    session.configuration().await.unwrap();
    backend.fail("r2", Call::GetParameter, BackendError::Other("unreachable".into()));
    let before = backend.total_calls(Call::GetParameter);

    let version = session.latest_version("demo").await.unwrap();

    assert_eq!(version, Version::new(1, 1, 0));
    assert_eq!(backend.total_calls(Call::GetParameter) - before, 4);
    assert_eq!(backend.calls("r5", Call::GetParameter), 0);
    assert!(progress.lines().is_empty());
}

#[tokio::test]
async fn test_partial_stage_reports_failed_regions() {
    let backend = seeded(&["r1", "r2", "r3"]);
    backend.fail("r3", Call::PutObject, BackendError::Other("throttled".into()));
    let (session, progress) = session(backend.clone(), &["r1", "r2", "r3"]);

    let err = session
        .stage("demo", Version::new(2, 0, 0), Bytes::from_static(b"x"), &Metadata::new())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Could not stage to every region. Failed in: r3");
    assert!(
        progress
            .lines()
            .contains(&"🔥 Failed to stage to r3: r3: throttled".to_string())
    );
    assert_eq!(backend.parameter("r1", "/demo/latest").unwrap(), "2.0.0");
    assert!(backend.parameter("r3", "/demo/latest").is_none());
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let backend = seeded(&["r1", "r2"]);
    let (session, progress) = session(backend.clone(), &["r1", "r2"]);
    let session = session.with_read_only(true);

    session
        .stage("demo", Version::new(1, 0, 0), Bytes::from_static(b"x"), &Metadata::new())
        .await
        .unwrap();

    assert_eq!(backend.total_calls(Call::PutObject), 0);
    assert_eq!(backend.total_calls(Call::PutParameter), 0);
    assert_eq!(backend.total_calls(Call::HeadObject), 2);
    let mut lines = progress.lines();
    lines.retain(|l| l.starts_with("🧁 Staged"));
    lines.sort();
    assert_eq!(
        lines,
        vec!["🧁 Staged (not really) to r1.", "🧁 Staged (not really) to r2."]
    );
}

#[tokio::test]
async fn test_filesystem_backend_round_trip() {
    let base = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(base.path());
    {
        use stager::backend::{Backend, ParameterStore};
        for region in ["r1", "r2"] {
            let parameters = backend.parameter_store(region);
            ParameterStore::put(parameters.as_ref(), "/startifact", CONFIGURATION)
                .await
                .unwrap();
            ParameterStore::put(parameters.as_ref(), "/bucket-name", "artifacts")
                .await
                .unwrap();
        }
    }

    let progress = Arc::new(BufferProgress::new());
    let session = Session::new(
        Arc::new(backend),
        Environment::from_vars([(REGIONS_VARIABLE, "r1,r2")]),
    )
    .unwrap()
    .with_poll_interval(Duration::from_millis(10))
    .with_progress(progress.clone());

    let source = base.path().join("build.tar.gz");
    std::fs::write(&source, b"tarball").unwrap();
    session
        .stage_file("demo", Version::new(0, 1, 0), &source, &Metadata::new())
        .await
        .unwrap();

    let artifact = session.get("demo", VersionSpec::Latest).await.unwrap();
    assert_eq!(artifact.version().await.unwrap(), &Version::new(0, 1, 0));
    assert!(artifact.metadata().await.unwrap().is_empty());

    let target = base.path().join("downloaded");
    artifact.download(&target).await.unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"tarball");
}
