//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use mock_helpers::{FakeCamera, FakeRegistry, FakeReprocess, RecordingSink, ScriptedBackend};
use snapshot_postproc::config::{CaptureSettings, PostProcConfig, SharedParameters};
use snapshot_postproc::PostProcessor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for waiting on worker threads
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Poll `cond` until it holds or the timeout expires
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Give the workers a moment to (not) act
pub fn settle() {
    thread::sleep(Duration::from_millis(50));
}

/// A post-processor wired to fakes, initialized but not started
pub struct Harness {
    pub camera: Arc<FakeCamera>,
    pub reprocess: Arc<FakeReprocess>,
    pub registry: Arc<FakeRegistry>,
    pub backend: Arc<ScriptedBackend>,
    pub sink: Arc<RecordingSink>,
    pub params: Arc<SharedParameters>,
    pub post: PostProcessor,
}

impl Harness {
    pub fn new(config: PostProcConfig, settings: CaptureSettings) -> Self {
        let mut harness = Self::uninitialized(config, settings);
        harness
            .post
            .init(harness.sink.clone())
            .expect("init post-processor");
        harness
    }

    pub fn uninitialized(config: PostProcConfig, settings: CaptureSettings) -> Self {
        let camera = Arc::new(FakeCamera::new());
        let reprocess = Arc::new(FakeReprocess::new());
        let registry = Arc::new(FakeRegistry::new(camera.clone(), Some(reprocess.clone())));
        let backend = Arc::new(ScriptedBackend::new());
        let sink = Arc::new(RecordingSink::new());
        let params = Arc::new(SharedParameters::new(settings));
        let post = PostProcessor::new(config, params.clone(), registry.clone(), backend.clone());
        Self {
            camera,
            reprocess,
            registry,
            backend,
            sink,
            params,
            post,
        }
    }

    /// Default config and settings, started
    pub fn started() -> Self {
        Self::started_with(PostProcConfig::default(), CaptureSettings::default())
    }

    pub fn started_with(config: PostProcConfig, settings: CaptureSettings) -> Self {
        let harness = Self::new(config, settings);
        harness.start();
        harness
    }

    pub fn start(&self) {
        self.post.start(self.camera.clone()).expect("start post-processor");
    }
}
