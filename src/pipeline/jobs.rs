//! Owned work items passed between pipeline stages.

use crate::backend::encoder::EncodeEvent;
use crate::metadata::MetadataTable;
use crate::pipeline::id::JobId;
use crate::pipeline::tracker::BufferTracker;
use crate::types::CapturedBuffer;
use std::sync::Arc;

/// A buffer on its way through the encoder
#[derive(Debug)]
pub struct EncodeJob {
    pub src: CapturedBuffer,
    /// Pre-reprocess input, kept for its thumbnail and metadata planes
    pub src_reproc: Option<CapturedBuffer>,
    /// `JobId::INVALID` until the backend accepts the job
    pub job_id: JobId,
    pub exif: Option<Arc<MetadataTable>>,
}

impl EncodeJob {
    pub fn new(src: CapturedBuffer) -> Self {
        Self {
            src,
            src_reproc: None,
            job_id: JobId::INVALID,
            exif: None,
        }
    }

    pub fn reprocessed(src: CapturedBuffer, original: CapturedBuffer) -> Self {
        Self {
            src_reproc: Some(original),
            ..Self::new(src)
        }
    }

    /// Whether this job is the one the backend reported as `id`
    pub fn matches(&self, id: JobId) -> bool {
        id.is_valid() && self.job_id == id
    }

    /// Return both source buffers to their channels
    pub fn release(self, tracker: &BufferTracker) {
        tracker.release_logged(self.src);
        if let Some(original) = self.src_reproc {
            tracker.release_logged(original);
        }
    }
}

/// A buffer handed to the reprocess channel, awaiting its transformed output
#[derive(Debug)]
pub struct ReprocessJob {
    pub src: CapturedBuffer,
}

impl ReprocessJob {
    pub fn frame_number(&self) -> u32 {
        self.src.frame_number
    }

    pub fn release(self, tracker: &BufferTracker) {
        tracker.release_logged(self.src);
    }
}

/// Completion event deferred to the save worker
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub event: EncodeEvent,
}
