//! End-to-end tests with the software JPEG backend

#![cfg(feature = "software-encoder")]

mod common;

use common::builders::{full_capture, SNAPSHOT_SIZE};
use common::mock_helpers::{FakeCamera, FakeRegistry, RecordingSink};
use common::wait_until;
use snapshot_postproc::backend::SoftwareJpegBackend;
use snapshot_postproc::config::{CaptureSettings, PostProcConfig, SharedParameters};
use snapshot_postproc::PostProcessor;
use std::sync::Arc;

fn run(settings: CaptureSettings, frames: u32) -> (Arc<RecordingSink>, Arc<FakeCamera>) {
    let camera = Arc::new(FakeCamera::new());
    let sink = Arc::new(RecordingSink::new());
    let mut post = PostProcessor::new(
        PostProcConfig::default(),
        Arc::new(SharedParameters::new(settings)),
        Arc::new(FakeRegistry::new(camera.clone(), None)),
        Arc::new(SoftwareJpegBackend::new()),
    );
    post.init(sink.clone()).unwrap();
    post.start(camera.clone()).unwrap();

    for n in 0..frames {
        post.submit_captured(full_capture(n)).unwrap();
    }
    assert!(wait_until(|| sink.jpegs().len() == frames as usize));

    post.stop().unwrap();
    post.deinit();
    (sink, camera)
}

#[test]
fn test_frames_are_encoded_end_to_end() {
    let (sink, camera) = run(CaptureSettings::default(), 3);

    for jpeg in sink.jpegs() {
        assert_eq!(&jpeg[..2], &[0xFFu8, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(
            (decoded.width(), decoded.height()),
            (SNAPSHOT_SIZE.width, SNAPSHOT_SIZE.height)
        );
    }
    assert_eq!(camera.returned(), vec![0, 1, 2]);
    assert!(sink.errors().is_empty());
}

#[test]
fn test_quarter_turn_rotates_output() {
    let settings = CaptureSettings {
        rotation: 90,
        ..Default::default()
    };
    let (sink, _camera) = run(settings, 1);

    let decoded = image::load_from_memory(&sink.jpegs()[0]).unwrap();
    assert_eq!(
        (decoded.width(), decoded.height()),
        (SNAPSHOT_SIZE.height, SNAPSHOT_SIZE.width)
    );
}
