//! Raw/YUV passthrough: deliver the uncompressed picture without encoding.

use crate::backend::sink::{Delivery, DeliverySink, MessageType};
use crate::config::YuvFrameInfo;
use crate::error::{PostProcError, Result};
use crate::pipeline::tracker::BufferTracker;
use crate::types::{BufferRole, CapturedBuffer};

/// Send the raw plane of `buf` to the sink, then release `buf`.
///
/// The buffer is returned to its channel whether or not delivery succeeds.
pub fn process_raw(tracker: &BufferTracker, sink: &dyn DeliverySink, buf: CapturedBuffer) -> Result<()> {
    let result = deliver_raw(sink, &buf);
    tracker.release_logged(buf);
    result
}

fn deliver_raw(sink: &dyn DeliverySink, buf: &CapturedBuffer) -> Result<()> {
    let plane = buf.find_by_role(BufferRole::Raw).ok_or_else(|| {
        PostProcError::invalid(format!("frame {} has no raw plane", buf.frame_number))
    })?;

    if sink.is_enabled(MessageType::RawImage) {
        sink.deliver(Delivery::RawImage {
            index: 0,
            data: plane.data.clone(),
        })?;
    }
    if sink.is_enabled(MessageType::RawImageNotify) {
        sink.deliver(Delivery::RawImageNotify)?;
    }
    if sink.is_enabled(MessageType::CompressedImage) {
        tracing::debug!("Delivering {} byte raw frame {}", plane.data.len(), buf.frame_number);
        sink.deliver(Delivery::Raw(plane.data.clone()))?;
    }
    Ok(())
}

/// Describe the layout of the snapshot plane in `buf`, for publishing to the host
pub fn yuv_frame_info(tracker: &BufferTracker, buf: &CapturedBuffer) -> Result<YuvFrameInfo> {
    let plane = buf
        .find_by_role(BufferRole::Snapshot)
        .ok_or_else(|| PostProcError::invalid("no snapshot plane for YUV frame info"))?;
    let info = tracker
        .owner_of(buf)?
        .stream_info(plane.stream_id)
        .ok_or_else(|| PostProcError::invalid(format!("unknown stream {}", plane.stream_id)))?;

    let luma = info.offset.planes.first().copied().unwrap_or_default();
    Ok(YuvFrameInfo {
        frame_len: info.offset.frame_len,
        y_offset: luma.offset,
        cbcr_offset: luma.len.saturating_sub(info.dim.area() as u32),
        format: info.format.name().to_string(),
    })
}
