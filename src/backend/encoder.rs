//! EncodeBackend trait for session-based JPEG encoders
//!
//! The backend protocol is: `open` a client (registering the completion
//! callback), `create_session` with an [`EncodeSessionConfig`], submit jobs
//! with `start_job`, and tear down with `abort_job` / `destroy_session` /
//! `close`.
//!
//! Completion is reported asynchronously through the [`EncodeCallback`]
//! registered at `open`. Implementations must not invoke the callback from
//! inside `start_job`; the pipeline holds its dispatch lock across that call.

use crate::error::Result;
use crate::metadata::MetadataTable;
use crate::pipeline::id::{ClientHandle, JobId, SessionId};
use crate::types::{CropRect, Dimension, FrameOffset, JpegColorFormat};
use bytes::Bytes;
use std::sync::Arc;

/// Completion status reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeStatus {
    Done,
    Error,
}

/// Completion event for one encode job
#[derive(Debug, Clone)]
pub struct EncodeEvent {
    pub job_id: JobId,
    pub status: EncodeStatus,
    /// Encoded bitstream; empty on error
    pub output: Bytes,
}

impl EncodeEvent {
    pub fn done(job_id: JobId, output: Bytes) -> Self {
        Self {
            job_id,
            status: EncodeStatus::Done,
            output,
        }
    }

    pub fn failed(job_id: JobId) -> Self {
        Self {
            job_id,
            status: EncodeStatus::Error,
            output: Bytes::new(),
        }
    }
}

/// Callback invoked by the backend when a job completes
pub type EncodeCallback = Arc<dyn Fn(EncodeEvent) + Send + Sync>;

/// Destination buffer slot for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstIndex {
    /// Backend picks a free destination buffer (burst mode)
    Auto,
    Slot(u32),
}

/// Session-wide encoder parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSessionConfig {
    pub main_dim: Dimension,
    pub main_format: JpegColorFormat,
    /// `None` when no thumbnail is encoded
    pub thumbnail_dim: Option<Dimension>,
    pub thumbnail_format: JpegColorFormat,
    pub quality: u32,
    pub thumbnail_quality: u32,
    pub rotation: u32,
    pub burst: bool,
    pub output_buffers: usize,
    pub output_buffer_len: usize,
}

/// One source image (main or thumbnail) of a job
#[derive(Debug, Clone)]
pub struct EncodeImageSource {
    pub data: Bytes,
    pub buf_index: u32,
    pub format: JpegColorFormat,
    pub src_dim: Dimension,
    pub offset: FrameOffset,
    pub crop: CropRect,
    pub dst_dim: Dimension,
}

/// Everything the backend needs to run one encode job
#[derive(Debug, Clone)]
pub struct EncodeJobDescriptor {
    pub session: SessionId,
    pub main: EncodeImageSource,
    pub thumbnail: Option<EncodeImageSource>,
    pub metadata: Option<Bytes>,
    pub exif: Option<Arc<MetadataTable>>,
    pub quality: u32,
    pub thumbnail_quality: u32,
    pub rotation: u32,
    pub dst_index: DstIndex,
}

/// Session-based JPEG encoder
#[cfg_attr(test, mockall::automock)]
pub trait EncodeBackend: Send + Sync {
    /// Open a client able to encode pictures up to `max_dim`
    fn open(&self, max_dim: Dimension, on_event: EncodeCallback) -> Result<ClientHandle>;

    fn create_session(
        &self,
        client: ClientHandle,
        config: &EncodeSessionConfig,
    ) -> Result<SessionId>;

    /// Submit a job; the returned id is echoed in its completion event.
    ///
    /// The completion callback must not run before this call returns.
    fn start_job(&self, job: EncodeJobDescriptor) -> Result<JobId>;

    /// Cancel a job; no completion is expected afterwards
    fn abort_job(&self, job: JobId) -> Result<()>;

    fn destroy_session(&self, session: SessionId) -> Result<()>;

    fn close(&self, client: ClientHandle) -> Result<()>;
}
