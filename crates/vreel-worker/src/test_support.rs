//! In-process fakes shared by the worker's unit tests.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use vreel_queue::{JobPublisher, QueueError, QueueJob, QueueResult};
use vreel_render::{RenderEngine, RenderJobSpec, RenderResult};
use vreel_storage::{ObjectStorage, StorageError, StorageResult};

/// Object store that serves fixed bytes and records uploads.
#[derive(Default)]
pub struct FakeStorage {
    missing: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
    fail_urls: AtomicBool,
}

impl FakeStorage {
    pub fn missing(&self, key: &str) {
        self.missing.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_urls(&self) {
        self.fail_urls.store(true, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        if self.missing.lock().unwrap().contains(key) {
            return Err(StorageError::not_found(key));
        }
        tokio::fs::write(path, b"video").await?;
        Ok(())
    }

    async fn upload_file(&self, _path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn playable_url(&self, key: &str) -> StorageResult<String> {
        if self.fail_urls.load(Ordering::SeqCst) {
            return Err(StorageError::PresignFailed(key.to_string()));
        }
        Ok(format!("https://cdn.test/{}", key))
    }
}

/// Render engine that hands out sequential external ids.
#[derive(Default)]
pub struct FakeEngine {
    submitted: AtomicUsize,
    pub specs: Mutex<Vec<RenderJobSpec>>,
}

impl FakeEngine {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn submit(&self, spec: &RenderJobSpec) -> RenderResult<String> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        Ok(format!("ext-{}", n))
    }
}

/// Publisher that records jobs, optionally rejecting them as duplicates.
#[derive(Default)]
pub struct FakePublisher {
    pub published: Mutex<Vec<QueueJob>>,
    duplicates: AtomicBool,
}

impl FakePublisher {
    pub fn reject_duplicates(&self) {
        self.duplicates.store(true, Ordering::SeqCst);
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.published.lock().unwrap().iter().map(|j| j.kind()).collect()
    }
}

#[async_trait]
impl JobPublisher for FakePublisher {
    async fn publish(&self, job: QueueJob) -> QueueResult<String> {
        if self.duplicates.load(Ordering::SeqCst) {
            return Err(QueueError::Duplicate(job.idempotency_key()));
        }
        let mut published = self.published.lock().unwrap();
        published.push(job);
        Ok(format!("{}-0", published.len()))
    }
}
