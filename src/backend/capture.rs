//! Capture and reprocess channel interfaces
//!
//! The pipeline never allocates hardware buffers itself. Buffers come from a
//! [`CaptureChannel`] and must be returned to it through
//! [`CaptureChannel::buf_done`]. When reprocessing is enabled, a
//! [`ReprocessChannel`] is obtained from the [`ChannelRegistry`] at start and
//! produces new buffers (with its own channel handle) that are returned to it
//! the same way.

use crate::error::Result;
use crate::pipeline::id::{ChannelId, StreamId};
use crate::types::{CapturedBuffer, StreamInfo};
use std::sync::Arc;

/// A source of captured buffers
pub trait CaptureChannel: Send + Sync {
    /// Handle identifying this channel on its buffers
    fn handle(&self) -> ChannelId;

    /// Geometry and format of one of the channel's streams
    fn stream_info(&self, stream: StreamId) -> Option<StreamInfo>;

    /// Return ownership of a buffer to the channel
    fn buf_done(&self, buf: CapturedBuffer) -> Result<()>;
}

/// A channel that transforms captured buffers
///
/// Output buffers are handed back to the pipeline through
/// `PostProcessor::submit_reprocessed` and keep the `frame_number` of their
/// input.
pub trait ReprocessChannel: CaptureChannel {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    /// Queue `buf` for transformation. The input stays owned by the caller.
    ///
    /// The output may be handed back before this call returns.
    fn do_reprocess(&self, buf: &CapturedBuffer) -> Result<()>;
}

/// Host-side registry of active channels
pub trait ChannelRegistry: Send + Sync {
    /// Resolve a channel handle to an active capture channel
    fn channel_by_handle(&self, id: ChannelId) -> Option<Arc<dyn CaptureChannel>>;

    /// Create a reprocess channel fed from `source`. `None` when the host cannot provide one.
    fn add_reprocess_channel(
        &self,
        source: &Arc<dyn CaptureChannel>,
    ) -> Option<Arc<dyn ReprocessChannel>>;
}
