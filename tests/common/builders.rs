//! Test data builders

use bytes::Bytes;
use snapshot_postproc::pipeline::{ChannelId, StreamId};
use snapshot_postproc::types::{CropRect, FrameOffset};
use snapshot_postproc::{CapturedBuffer, Dimension, ImageFormat, PlaneBuffer, StreamInfo, StreamType};

pub const CAMERA: ChannelId = ChannelId(1);
pub const REPROCESS: ChannelId = ChannelId(2);

pub const SNAPSHOT_STREAM: StreamId = StreamId(1);
pub const PREVIEW_STREAM: StreamId = StreamId(2);
pub const METADATA_STREAM: StreamId = StreamId(3);
pub const RAW_STREAM: StreamId = StreamId(4);
pub const OFFLINE_STREAM: StreamId = StreamId(10);

pub const SNAPSHOT_SIZE: Dimension = Dimension::new(64, 48);
pub const PREVIEW_SIZE: Dimension = Dimension::new(32, 24);

/// NV21 stream description with a full-frame crop
pub fn stream(id: StreamId, stream_type: StreamType, dim: Dimension) -> StreamInfo {
    let offset = FrameOffset::semi_planar_420(dim);
    StreamInfo {
        id,
        stream_type,
        original_type: None,
        dim,
        crop: CropRect::full(dim),
        buf_len: offset.frame_len,
        offset,
        format: ImageFormat::Nv21,
        num_bufs: 4,
    }
}

/// Mid-grey NV21 frame
pub fn grey_frame(dim: Dimension) -> Bytes {
    Bytes::from(vec![128u8; dim.area() * 3 / 2])
}

/// Builder for captured buffers from the fake camera
pub struct CaptureBuilder {
    buf: CapturedBuffer,
}

impl CaptureBuilder {
    pub fn new(frame_number: u32) -> Self {
        Self {
            buf: CapturedBuffer::new(CAMERA, frame_number),
        }
    }

    pub fn snapshot(mut self) -> Self {
        let index = self.buf.frame_number;
        self.buf = self.buf.with_plane(PlaneBuffer::new(
            SNAPSHOT_STREAM,
            StreamType::Snapshot,
            index,
            grey_frame(SNAPSHOT_SIZE),
        ));
        self
    }

    pub fn preview(mut self) -> Self {
        let index = self.buf.frame_number;
        self.buf = self.buf.with_plane(PlaneBuffer::new(
            PREVIEW_STREAM,
            StreamType::Preview,
            index,
            grey_frame(PREVIEW_SIZE),
        ));
        self
    }

    pub fn metadata(mut self, payload: &'static [u8]) -> Self {
        let index = self.buf.frame_number;
        self.buf = self.buf.with_plane(PlaneBuffer::new(
            METADATA_STREAM,
            StreamType::Metadata,
            index,
            Bytes::from_static(payload),
        ));
        self
    }

    pub fn raw(mut self, payload: &'static [u8]) -> Self {
        let index = self.buf.frame_number;
        self.buf = self.buf.with_plane(PlaneBuffer::new(
            RAW_STREAM,
            StreamType::Raw,
            index,
            Bytes::from_static(payload),
        ));
        self
    }

    pub fn build(self) -> CapturedBuffer {
        self.buf
    }
}

/// Snapshot + preview + metadata, the usual shape of a capture
pub fn full_capture(frame_number: u32) -> CapturedBuffer {
    CaptureBuilder::new(frame_number)
        .snapshot()
        .preview()
        .metadata(b"meta")
        .build()
}

/// Reprocess channel output for `frame_number`
pub fn reprocessed_output(frame_number: u32) -> CapturedBuffer {
    CapturedBuffer::new(REPROCESS, frame_number).with_plane(
        PlaneBuffer::new(
            OFFLINE_STREAM,
            StreamType::Offline,
            frame_number,
            grey_frame(SNAPSHOT_SIZE),
        )
        .reprocessed_from(StreamType::Snapshot),
    )
}
