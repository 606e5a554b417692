//! In-process regional stores for tests and local experiments.
//!
//! Every region gets its own objects and parameters. Failures can be injected
//! per region and per call, and every call is counted so tests can assert
//! which regions were touched and which writes never happened.

use super::{Backend, BackendError, BackendResult, BlobStore, ParameterStore, make_parameter_arn};
use crate::hash::b64_md5;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const ACCOUNT_ID: &str = "123456789012";

/// Backend calls, as counted by [`MemoryBackend::calls`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    HeadObject,
    GetObject,
    PutObject,
    GetParameter,
    PutParameter,
    DeleteParameter,
}

#[derive(Default)]
struct State {
    // (region, bucket, key)
    objects: HashMap<(String, String, String), Bytes>,
    // (region, name)
    parameters: HashMap<(String, String), String>,
    faults: HashMap<(String, Call), BackendError>,
    region_faults: HashMap<String, BackendError>,
    calls: HashMap<(String, Call), usize>,
    in_flight: usize,
    peak_in_flight: usize,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, which lets tests observe concurrency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every call of `call` in `region` fail with `error`.
    pub fn fail(&self, region: &str, call: Call, error: BackendError) {
        self.lock().faults.insert((region.to_string(), call), error);
    }

    /// Makes every call in `region` fail with `error`.
    pub fn fail_region(&self, region: &str, error: BackendError) {
        self.lock().region_faults.insert(region.to_string(), error);
    }

    pub fn set_parameter(&self, region: &str, name: &str, value: &str) {
        self.lock()
            .parameters
            .insert((region.to_string(), name.to_string()), value.to_string());
    }

    pub fn parameter(&self, region: &str, name: &str) -> Option<String> {
        self.lock()
            .parameters
            .get(&(region.to_string(), name.to_string()))
            .cloned()
    }

    pub fn set_object(&self, region: &str, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.lock().objects.insert(
            (region.to_string(), bucket.to_string(), key.to_string()),
            body.into(),
        );
    }

    pub fn object(&self, region: &str, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(region.to_string(), bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of `call`s made against `region`, including failed ones.
    pub fn calls(&self, region: &str, call: Call) -> usize {
        self.lock()
            .calls
            .get(&(region.to_string(), call))
            .copied()
            .unwrap_or(0)
    }

    /// Number of `call`s made against any region.
    pub fn total_calls(&self, call: Call) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|((_, c), _)| *c == call)
            .map(|(_, count)| *count)
            .sum()
    }

    /// Highest number of calls that were ever in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, region: &str, call: Call) -> BackendResult<()> {
        {
            let mut state = self.lock();
            *state.calls.entry((region.to_string(), call)).or_default() += 1;
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.in_flight -= 1;

        if let Some(error) = state.region_faults.get(region) {
            return Err(error.clone());
        }
        match state.faults.get(&(region.to_string(), call)) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Backend for MemoryBackend {
    fn blob_store(&self, region: &str) -> Box<dyn BlobStore> {
        Box::new(MemoryStore {
            backend: self.clone(),
            region: region.to_string(),
        })
    }

    fn parameter_store(&self, region: &str) -> Box<dyn ParameterStore> {
        Box::new(MemoryStore {
            backend: self.clone(),
            region: region.to_string(),
        })
    }
}

struct MemoryStore {
    backend: MemoryBackend,
    region: String,
}

impl MemoryStore {
    fn object_key(&self, bucket: &str, key: &str) -> (String, String, String) {
        (self.region.clone(), bucket.to_string(), key.to_string())
    }

    fn parameter_key(&self, name: &str) -> (String, String) {
        (self.region.clone(), name.to_string())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn region(&self) -> &str {
        &self.region
    }

    async fn head(&self, bucket: &str, key: &str) -> BackendResult<()> {
        self.backend.enter(&self.region, Call::HeadObject).await?;
        let state = self.backend.lock();
        match state.objects.contains_key(&self.object_key(bucket, key)) {
            true => Ok(()),
            false => Err(BackendError::NotFound),
        }
    }

    async fn get(&self, bucket: &str, key: &str) -> BackendResult<Bytes> {
        self.backend.enter(&self.region, Call::GetObject).await?;
        self.backend
            .lock()
            .objects
            .get(&self.object_key(bucket, key))
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_md5: &str,
    ) -> BackendResult<()> {
        self.backend.enter(&self.region, Call::PutObject).await?;
        if b64_md5(&body) != content_md5 {
            return Err(BackendError::Other(format!(
                "Content-MD5 {content_md5} does not match the body"
            )));
        }
        self.backend
            .lock()
            .objects
            .insert(self.object_key(bucket, key), body);
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for MemoryStore {
    fn region(&self) -> &str {
        &self.region
    }

    fn arn(&self, name: &str) -> String {
        make_parameter_arn(&self.region, ACCOUNT_ID, name)
    }

    async fn get(&self, name: &str) -> BackendResult<String> {
        self.backend.enter(&self.region, Call::GetParameter).await?;
        self.backend
            .lock()
            .parameters
            .get(&self.parameter_key(name))
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn put(&self, name: &str, value: &str) -> BackendResult<()> {
        self.backend.enter(&self.region, Call::PutParameter).await?;
        self.backend
            .lock()
            .parameters
            .insert(self.parameter_key(name), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> BackendResult<()> {
        self.backend.enter(&self.region, Call::DeleteParameter).await?;
        self.backend
            .lock()
            .parameters
            .remove(&self.parameter_key(name))
            .map(|_| ())
            .ok_or(BackendError::NotFound)
    }
}
