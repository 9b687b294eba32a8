//! Synthetic collaborators for the demo binary
//!
//! - [`SyntheticCamera`] produces NV21 gradient frames with a preview and a
//!   metadata plane
//! - [`LoopbackReprocess`] "reprocesses" by handing the snapshot plane back
//!   on its own channel
//! - [`FileSink`] writes delivered pictures into a directory

use bytes::Bytes;
use crossbeam_channel::Sender;
use snapshot_postproc::backend::{
    CaptureChannel, ChannelRegistry, Delivery, DeliverySink, MessageType, Notification,
    ReprocessChannel,
};
use snapshot_postproc::pipeline::{ChannelId, StreamId};
use snapshot_postproc::types::{CropRect, FrameOffset};
use snapshot_postproc::{
    BufferRole, CapturedBuffer, Dimension, ImageFormat, PlaneBuffer, PostProcError, Result,
    StreamInfo, StreamType,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

const CAMERA: ChannelId = ChannelId(1);
const REPROCESS: ChannelId = ChannelId(2);
const SNAPSHOT_STREAM: StreamId = StreamId(1);
const PREVIEW_STREAM: StreamId = StreamId(2);
const METADATA_STREAM: StreamId = StreamId(3);
const OFFLINE_STREAM: StreamId = StreamId(10);
const PREVIEW_SIZE: Dimension = Dimension::new(320, 240);

fn nv21_stream(id: StreamId, stream_type: StreamType, dim: Dimension) -> StreamInfo {
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

/// NV21 frame with a diagonal luma gradient that shifts with `seed`
fn gradient_nv21(dim: Dimension, seed: u32) -> Bytes {
    let (w, h) = (dim.width as usize, dim.height as usize);
    let mut data = Vec::with_capacity(w * h * 3 / 2);
    for y in 0..h {
        for x in 0..w {
            data.push(((x + y) / 4 + seed as usize * 16) as u8);
        }
    }
    for y in 0..h / 2 {
        for x in 0..w / 2 {
            data.push((96 + y * 64 / h.max(1)) as u8);
            data.push((96 + x * 64 / w.max(1)) as u8);
        }
    }
    Bytes::from(data)
}

/// Capture channel producing synthetic frames
pub struct SyntheticCamera {
    snapshot: StreamInfo,
    preview: StreamInfo,
    returned: AtomicUsize,
}

impl SyntheticCamera {
    pub fn new(size: Dimension) -> Self {
        Self {
            snapshot: nv21_stream(SNAPSHOT_STREAM, StreamType::Snapshot, size),
            preview: nv21_stream(PREVIEW_STREAM, StreamType::Preview, PREVIEW_SIZE),
            returned: AtomicUsize::new(0),
        }
    }

    pub fn capture(&self, frame_number: u32) -> CapturedBuffer {
        let index = frame_number % self.snapshot.num_bufs;
        CapturedBuffer::new(CAMERA, frame_number)
            .with_plane(PlaneBuffer::new(
                SNAPSHOT_STREAM,
                StreamType::Snapshot,
                index,
                gradient_nv21(self.snapshot.dim, frame_number),
            ))
            .with_plane(PlaneBuffer::new(
                PREVIEW_STREAM,
                StreamType::Preview,
                index,
                gradient_nv21(PREVIEW_SIZE, frame_number),
            ))
            .with_plane(PlaneBuffer::new(
                METADATA_STREAM,
                StreamType::Metadata,
                index,
                Bytes::from(frame_number.to_le_bytes().to_vec()),
            ))
    }

    /// Buffers handed back by the pipeline so far
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::SeqCst)
    }
}

impl CaptureChannel for SyntheticCamera {
    fn handle(&self) -> ChannelId {
        CAMERA
    }

    fn stream_info(&self, stream: StreamId) -> Option<StreamInfo> {
        match stream {
            SNAPSHOT_STREAM => Some(self.snapshot.clone()),
            PREVIEW_STREAM => Some(self.preview.clone()),
            _ => None,
        }
    }

    fn buf_done(&self, buf: CapturedBuffer) -> Result<()> {
        tracing::trace!("Camera got frame {} back", buf.frame_number);
        self.returned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reprocess channel that returns the snapshot plane unchanged on its own stream
pub struct LoopbackReprocess {
    offline: StreamInfo,
    outputs: Sender<CapturedBuffer>,
}

impl CaptureChannel for LoopbackReprocess {
    fn handle(&self) -> ChannelId {
        REPROCESS
    }

    fn stream_info(&self, stream: StreamId) -> Option<StreamInfo> {
        (stream == OFFLINE_STREAM).then(|| self.offline.clone())
    }

    fn buf_done(&self, buf: CapturedBuffer) -> Result<()> {
        tracing::trace!("Reprocess output {} returned", buf.frame_number);
        Ok(())
    }
}

impl ReprocessChannel for LoopbackReprocess {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }

    fn do_reprocess(&self, buf: &CapturedBuffer) -> Result<()> {
        let snapshot = buf
            .find_by_role(BufferRole::Snapshot)
            .ok_or_else(|| PostProcError::InvalidArgument("nothing to reprocess".into()))?;
        let output = CapturedBuffer::new(REPROCESS, buf.frame_number).with_plane(
            PlaneBuffer::new(
                OFFLINE_STREAM,
                StreamType::Offline,
                snapshot.buf_index,
                snapshot.data.clone(),
            )
            .reprocessed_from(StreamType::Snapshot),
        );
        self.outputs
            .send(output)
            .map_err(|_| PostProcError::Channel("reprocess output dropped".into()))
    }
}

/// Registry knowing the one synthetic camera
pub struct DemoRegistry {
    camera: Arc<SyntheticCamera>,
    outputs: Sender<CapturedBuffer>,
}

impl DemoRegistry {
    pub fn new(camera: Arc<SyntheticCamera>, outputs: Sender<CapturedBuffer>) -> Self {
        Self { camera, outputs }
    }
}

impl ChannelRegistry for DemoRegistry {
    fn channel_by_handle(&self, id: ChannelId) -> Option<Arc<dyn CaptureChannel>> {
        (id == CAMERA).then(|| Arc::clone(&self.camera) as Arc<dyn CaptureChannel>)
    }

    fn add_reprocess_channel(
        &self,
        source: &Arc<dyn CaptureChannel>,
    ) -> Option<Arc<dyn ReprocessChannel>> {
        let mut offline = source.stream_info(SNAPSHOT_STREAM)?;
        offline.id = OFFLINE_STREAM;
        offline.stream_type = StreamType::Offline;
        offline.original_type = Some(StreamType::Snapshot);
        Some(Arc::new(LoopbackReprocess {
            offline,
            outputs: self.outputs.clone(),
        }))
    }
}

/// What happened to one picture
#[derive(Debug)]
pub enum SinkEvent {
    Written(PathBuf),
    Failed(String),
}

/// Sink writing pictures into a directory
pub struct FileSink {
    dir: PathBuf,
    counter: AtomicU32,
    events: Sender<SinkEvent>,
}

impl FileSink {
    pub fn new(dir: PathBuf, events: Sender<SinkEvent>) -> Self {
        Self {
            dir,
            counter: AtomicU32::new(0),
            events,
        }
    }

    fn write(&self, extension: &str, data: &[u8]) -> Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("frame_{:03}.{}", n, extension));
        std::fs::write(&path, data)?;
        Ok(path)
    }
}

impl DeliverySink for FileSink {
    fn is_enabled(&self, msg: MessageType) -> bool {
        msg != MessageType::RawImage
    }

    fn deliver(&self, delivery: Delivery) -> Result<()> {
        let path = match delivery {
            Delivery::Jpeg(data) => self.write("jpg", &data)?,
            Delivery::Raw(data) => self.write("yuv", &data)?,
            Delivery::SavedFile { path, .. } => path,
            Delivery::RawImageNotify => {
                tracing::trace!("Raw image ready");
                return Ok(());
            }
            Delivery::RawImage { .. } => return Ok(()),
        };
        let _ = self.events.send(SinkEvent::Written(path));
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Shutter => tracing::info!("*click*"),
            Notification::Error { kind, message } => {
                let _ = self
                    .events
                    .send(SinkEvent::Failed(format!("{:?}: {}", kind, message)));
            }
        }
    }
}
