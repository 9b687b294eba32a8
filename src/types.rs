//! Core data types for the post-processing pipeline
//!
//! # Main Types
//!
//! - [`CapturedBuffer`] - A multi-plane buffer bundle produced by a capture channel
//! - [`PlaneBuffer`] - One plane of a bundle, tagged with its stream type
//! - [`BufferRole`] - Role-based lookup of the snapshot/thumbnail/metadata/raw plane
//! - [`StreamInfo`] - Geometry and format of a stream, as reported by its channel
//! - [`ImageFormat`] / [`JpegColorFormat`] - Sensor output formats and their encoder mapping
//!
//! # Ownership
//!
//! A `CapturedBuffer` is deliberately not `Clone`. Exactly one pipeline stage
//! owns it at a time and it must be handed back to its channel exactly once,
//! through [`crate::pipeline::BufferTracker::release`]. Plane payloads are
//! `bytes::Bytes`, so encode descriptors can share them without copying.

use crate::pipeline::id::{ChannelId, StreamId};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of stream a plane was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    Snapshot,
    Preview,
    Postview,
    Raw,
    Metadata,
    /// Output of a reprocess channel; see `PlaneBuffer::original_type`
    Offline,
}

/// Role a plane plays when building an encode job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Main image to encode
    Snapshot,
    /// Optional thumbnail source (preview or postview)
    Thumbnail,
    /// Sensor metadata blob
    Metadata,
    /// Raw passthrough source (snapshot or raw)
    Raw,
}

impl BufferRole {
    fn accepts(self, stream_type: StreamType) -> bool {
        match self {
            BufferRole::Snapshot => stream_type == StreamType::Snapshot,
            BufferRole::Thumbnail => {
                matches!(stream_type, StreamType::Preview | StreamType::Postview)
            }
            BufferRole::Metadata => stream_type == StreamType::Metadata,
            BufferRole::Raw => matches!(stream_type, StreamType::Snapshot | StreamType::Raw),
        }
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width and height exchanged
    pub fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Crop rectangle within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Crop covering the whole frame
    pub fn full(dim: Dimension) -> Self {
        Self::new(0, 0, dim.width, dim.height)
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }
}

/// Layout of one plane within a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    pub len: u32,
    pub offset: u32,
    pub stride: u32,
    pub scanline: u32,
}

/// Layout of a whole frame buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameOffset {
    pub frame_len: u32,
    pub planes: Vec<PlaneLayout>,
}

impl FrameOffset {
    /// Tightly packed two-plane 4:2:0 layout
    pub fn semi_planar_420(dim: Dimension) -> Self {
        let y_len = dim.width * dim.height;
        let c_len = y_len / 2;
        Self {
            frame_len: y_len + c_len,
            planes: vec![
                PlaneLayout {
                    len: y_len,
                    offset: 0,
                    stride: dim.width,
                    scanline: dim.height,
                },
                PlaneLayout {
                    len: c_len,
                    offset: 0,
                    stride: dim.width,
                    scanline: dim.height / 2,
                },
            ],
        }
    }
}

/// Sensor/stream pixel formats the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Nv21,
    Nv21Adreno,
    Nv12,
    Yv12,
    Nv61,
    Nv16,
    Bayer,
    Jpeg,
}

/// Chroma layout handed to the encode backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JpegColorFormat {
    /// Cr/Cb interleaved, 2x2 subsampled (NV21-like)
    CrCbH2V2,
    /// Cb/Cr interleaved, 2x2 subsampled (NV12-like)
    CbCrH2V2,
    /// Cr/Cb interleaved, horizontal subsampling only (NV61-like)
    CrCbH2V1,
    /// Cb/Cr interleaved, horizontal subsampling only (NV16-like)
    CbCrH2V1,
}

impl ImageFormat {
    pub fn jpeg_color_format(self) -> JpegColorFormat {
        match self {
            ImageFormat::Nv21 | ImageFormat::Nv21Adreno => JpegColorFormat::CrCbH2V2,
            ImageFormat::Nv12 | ImageFormat::Yv12 => JpegColorFormat::CbCrH2V2,
            ImageFormat::Nv61 => JpegColorFormat::CrCbH2V1,
            ImageFormat::Nv16 => JpegColorFormat::CbCrH2V1,
            _ => JpegColorFormat::CrCbH2V2,
        }
    }

    /// Name published alongside YUV frame info
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Nv21 => "yuv420sp",
            ImageFormat::Nv21Adreno => "yuv420sp-adreno",
            ImageFormat::Nv12 => "nv12",
            ImageFormat::Yv12 => "yuv420p",
            ImageFormat::Nv61 => "nv61",
            ImageFormat::Nv16 => "yuv422sp",
            ImageFormat::Bayer => "bayer",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

/// Stream description reported by a capture or reprocess channel
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub id: StreamId,
    pub stream_type: StreamType,
    /// For reprocess streams, the type of the stream being transformed
    pub original_type: Option<StreamType>,
    pub dim: Dimension,
    pub crop: CropRect,
    pub offset: FrameOffset,
    pub format: ImageFormat,
    pub num_bufs: u32,
    pub buf_len: u32,
}

/// One plane of a captured buffer bundle
#[derive(Debug)]
pub struct PlaneBuffer {
    pub stream_id: StreamId,
    pub stream_type: StreamType,
    pub original_type: Option<StreamType>,
    pub buf_index: u32,
    pub data: Bytes,
}

impl PlaneBuffer {
    pub fn new(stream_id: StreamId, stream_type: StreamType, buf_index: u32, data: Bytes) -> Self {
        Self {
            stream_id,
            stream_type,
            original_type: None,
            buf_index,
            data,
        }
    }

    /// Mark this plane as the reprocessed output of a stream of `original`
    pub fn reprocessed_from(mut self, original: StreamType) -> Self {
        self.original_type = Some(original);
        self
    }

    /// True when the plane's own or original stream type fills `role`
    pub fn plays(&self, role: BufferRole) -> bool {
        role.accepts(self.stream_type) || self.original_type.is_some_and(|t| role.accepts(t))
    }
}

/// A multi-plane buffer bundle from one channel
#[derive(Debug)]
pub struct CapturedBuffer {
    pub channel_id: ChannelId,
    /// Preserved by reprocess channels on their output
    pub frame_number: u32,
    pub planes: Vec<PlaneBuffer>,
}

impl CapturedBuffer {
    pub fn new(channel_id: ChannelId, frame_number: u32) -> Self {
        Self {
            channel_id,
            frame_number,
            planes: Vec::new(),
        }
    }

    pub fn with_plane(mut self, plane: PlaneBuffer) -> Self {
        self.planes.push(plane);
        self
    }

    /// First plane playing `role`, if any
    pub fn find_by_role(&self, role: BufferRole) -> Option<&PlaneBuffer> {
        self.planes.iter().find(|p| p.plays(role))
    }

    /// Shallow copy sharing the plane bytes. Only ever lent out by reference,
    /// so it can never be returned to a channel in place of the original.
    pub(crate) fn view(&self) -> CapturedBuffer {
        CapturedBuffer {
            channel_id: self.channel_id,
            frame_number: self.frame_number,
            planes: self
                .planes
                .iter()
                .map(|p| PlaneBuffer {
                    stream_id: p.stream_id,
                    stream_type: p.stream_type,
                    original_type: p.original_type,
                    buf_index: p.buf_index,
                    data: p.data.clone(),
                })
                .collect(),
        }
    }
}
