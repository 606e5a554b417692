use crate::backend::MemoryBackend;
use crate::config::{Environment, REGIONS_VARIABLE};
use crate::progress::BufferProgress;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;

pub const CONFIGURATION: &str = r#"{"bucket_key_prefix": "builds/", "bucket_param_name": "/bucket-name"}"#;

/// A backend where every region has a configuration and a bucket.
pub fn seeded_backend(regions: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for region in regions {
        backend.set_parameter(region, "/startifact", CONFIGURATION);
        backend.set_parameter(region, "/bucket-name", &format!("bucket-{region}"));
    }
    backend
}

pub struct TestSession {
    pub session: Session,
    pub progress: Arc<BufferProgress>,
}

impl TestSession {
    pub fn new(backend: MemoryBackend, regions: &[&str]) -> Self {
        let env = Environment::from_vars([(REGIONS_VARIABLE, regions.join(","))]);
        Self::with_environment(backend, env)
    }

    pub fn with_environment(backend: MemoryBackend, env: Environment) -> Self {
        let progress = Arc::new(BufferProgress::new());
        let session = Session::new(Arc::new(backend), env)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
            .with_progress(progress.clone());
        TestSession { session, progress }
    }
}
