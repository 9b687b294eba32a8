//! Reprocess stage coordination.
//!
//! When the host asks for reprocessing, captured buffers are handed to a
//! [`ReprocessChannel`] before encoding. Each handed-off buffer waits in the
//! ongoing queue as a [`ReprocessJob`] until the channel's output for the
//! same `frame_number` comes back, at which point the pair seeds an encode
//! job. Several reprocesses may be outstanding at once.
//!
//! The job is queued before the channel sees the frame, so a channel may hand
//! its output back from inside `do_reprocess`.

use crate::backend::capture::{CaptureChannel, ReprocessChannel};
use crate::error::{PostProcError, Result};
use crate::pipeline::jobs::ReprocessJob;
use crate::pipeline::queue::JobQueue;
use crate::pipeline::tracker::BufferTracker;
use crate::types::CapturedBuffer;
use std::sync::Arc;

pub struct ReprocessCoordinator {
    tracker: Arc<BufferTracker>,
    ongoing: JobQueue<ReprocessJob>,
}

impl ReprocessCoordinator {
    pub fn new(tracker: Arc<BufferTracker>) -> Self {
        let release_to = Arc::clone(&tracker);
        Self {
            tracker,
            ongoing: JobQueue::new("ongoing-reprocess", move |job: ReprocessJob| {
                job.release(&release_to)
            }),
        }
    }

    /// Obtain a reprocess channel fed from `source` and start it
    pub fn start(&self, source: &Arc<dyn CaptureChannel>) -> Result<()> {
        if self.is_active() {
            self.stop();
        }

        let channel = self
            .tracker
            .registry()
            .add_reprocess_channel(source)
            .ok_or_else(|| {
                tracing::error!("Cannot add reprocess channel for {}", source.handle());
                PostProcError::ResourceUnavailable("reprocess channel".into())
            })?;

        if let Err(e) = channel.start() {
            tracing::error!("Reprocess channel {} failed to start: {}", channel.handle(), e);
            return Err(e);
        }

        tracing::info!("Reprocess channel {} started", channel.handle());
        self.tracker.attach_reprocess(channel);
        Ok(())
    }

    /// Stop and discard the reprocess channel, if any
    pub fn stop(&self) {
        if let Some(channel) = self.tracker.detach_reprocess() {
            match channel.stop() {
                Ok(()) => tracing::info!("Reprocess channel {} stopped", channel.handle()),
                Err(e) => tracing::warn!("Reprocess channel {} stop failed: {}", channel.handle(), e),
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracker.reprocess_channel().is_some()
    }

    /// Hand `buf` to the reprocess channel. On failure the buffer is released.
    pub fn submit(&self, buf: CapturedBuffer) -> Result<()> {
        let Some(channel) = self.tracker.reprocess_channel() else {
            self.tracker.release_logged(buf);
            return Err(PostProcError::ResourceUnavailable(
                "no active reprocess channel".into(),
            ));
        };

        let frame = buf.frame_number;
        let request = buf.view();
        self.ongoing.enqueue(ReprocessJob { src: buf });

        if let Err(e) = channel.do_reprocess(&request) {
            tracing::error!("Reprocess of frame {} failed: {}", frame, e);
            // A concurrent stop may already have flushed it
            if let Some(job) = self.ongoing.take_first(|job| job.frame_number() == frame) {
                job.release(&self.tracker);
            }
            return Err(e);
        }
        tracing::debug!("Frame {} handed to reprocess", frame);
        Ok(())
    }

    /// Take the ongoing job whose input produced `output`
    pub fn take_matching(&self, output: &CapturedBuffer) -> Option<ReprocessJob> {
        self.ongoing
            .take_first(|job| job.frame_number() == output.frame_number)
    }

    /// Release every ongoing job
    pub fn flush(&self) -> usize {
        self.ongoing.flush()
    }

    pub fn ongoing_len(&self) -> usize {
        self.ongoing.len()
    }
}
