//! Buffer ownership tracking.
//!
//! Captured buffers must go back to the channel that produced them exactly
//! once. The tracker resolves a buffer's channel handle against the host's
//! registry first and the active reprocess channel second, and returns the
//! buffer there. Moving the buffer into [`BufferTracker::release`] makes a
//! second release of the same buffer impossible.

use crate::backend::capture::{CaptureChannel, ChannelRegistry, ReprocessChannel};
use crate::error::{PostProcError, Result};
use crate::pipeline::id::{ChannelId, StreamId};
use crate::types::{CapturedBuffer, StreamInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// The channel a buffer belongs to
#[derive(Clone)]
pub enum ChannelOwner {
    Capture(Arc<dyn CaptureChannel>),
    Reprocess(Arc<dyn ReprocessChannel>),
}

impl ChannelOwner {
    pub fn handle(&self) -> ChannelId {
        match self {
            ChannelOwner::Capture(ch) => ch.handle(),
            ChannelOwner::Reprocess(ch) => ch.handle(),
        }
    }

    pub fn stream_info(&self, stream: StreamId) -> Option<StreamInfo> {
        match self {
            ChannelOwner::Capture(ch) => ch.stream_info(stream),
            ChannelOwner::Reprocess(ch) => ch.stream_info(stream),
        }
    }

    fn buf_done(&self, buf: CapturedBuffer) -> Result<()> {
        match self {
            ChannelOwner::Capture(ch) => ch.buf_done(buf),
            ChannelOwner::Reprocess(ch) => ch.buf_done(buf),
        }
    }
}

/// Returns buffers to their owning channel
pub struct BufferTracker {
    registry: Arc<dyn ChannelRegistry>,
    reprocess: RwLock<Option<Arc<dyn ReprocessChannel>>>,
    released: AtomicU64,
}

impl BufferTracker {
    pub fn new(registry: Arc<dyn ChannelRegistry>) -> Self {
        Self {
            registry,
            reprocess: RwLock::new(None),
            released: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<dyn ChannelRegistry> {
        &self.registry
    }

    /// Make `channel` resolvable for buffers carrying its handle
    pub fn attach_reprocess(&self, channel: Arc<dyn ReprocessChannel>) {
        *self
            .reprocess
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(channel);
    }

    pub fn detach_reprocess(&self) -> Option<Arc<dyn ReprocessChannel>> {
        self.reprocess
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn reprocess_channel(&self) -> Option<Arc<dyn ReprocessChannel>> {
        self.reprocess
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve a channel handle: capture channel first, then the reprocess channel
    pub fn resolve(&self, id: ChannelId) -> Option<ChannelOwner> {
        if let Some(ch) = self.registry.channel_by_handle(id) {
            return Some(ChannelOwner::Capture(ch));
        }
        self.reprocess_channel()
            .filter(|ch| ch.handle() == id)
            .map(ChannelOwner::Reprocess)
    }

    /// Resolve the owner of `buf`, failing with `InvalidArgument`
    pub fn owner_of(&self, buf: &CapturedBuffer) -> Result<ChannelOwner> {
        self.resolve(buf.channel_id).ok_or_else(|| {
            PostProcError::invalid(format!("no channel for {}", buf.channel_id))
        })
    }

    /// Return `buf` to its channel.
    ///
    /// An unresolved channel handle is an `InvalidArgument` error; the buffer is
    /// dropped and the failure logged.
    pub fn release(&self, buf: CapturedBuffer) -> Result<()> {
        let owner = match self.resolve(buf.channel_id) {
            Some(owner) => owner,
            None => {
                tracing::error!(
                    "Cannot release frame {}: no channel for {}",
                    buf.frame_number,
                    buf.channel_id
                );
                return Err(PostProcError::invalid(format!(
                    "no channel for {}",
                    buf.channel_id
                )));
            }
        };

        tracing::trace!("Releasing frame {} to {}", buf.frame_number, owner.handle());
        self.released.fetch_add(1, Ordering::Relaxed);
        owner.buf_done(buf)
    }

    /// Release from a context that has no caller to report to; failures are logged
    pub fn release_logged(&self, buf: CapturedBuffer) {
        if let Err(e) = self.release(buf) {
            tracing::warn!("Buffer release failed: {}", e);
        }
    }

    /// Number of buffers handed back so far
    pub fn released_count(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }
}
