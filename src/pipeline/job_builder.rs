//! Translation of an [`EncodeJob`] into a backend job descriptor.
//!
//! [`build_and_dispatch`] resolves the snapshot, thumbnail and metadata planes
//! of a job, computes destination geometry, fires the raw-image callbacks,
//! makes sure an encode session exists and submits the job. On failure the
//! job is left untouched for the caller to release.

use crate::backend::encoder::{DstIndex, EncodeImageSource, EncodeJobDescriptor, EncodeSessionConfig};
use crate::backend::sink::{Delivery, DeliverySink, MessageType};
use crate::config::{CaptureSettings, ParameterSource, PostProcConfig};
use crate::error::{PostProcError, Result};
use crate::pipeline::id::JobId;
use crate::pipeline::jobs::EncodeJob;
use crate::pipeline::session::SessionManager;
use crate::pipeline::tracker::{BufferTracker, ChannelOwner};
use crate::types::{BufferRole, CapturedBuffer, Dimension, PlaneBuffer, StreamInfo};
use std::sync::Arc;

/// Borrowed collaborators needed to build a job
pub struct BuildContext<'a> {
    pub tracker: &'a BufferTracker,
    pub session: &'a SessionManager,
    pub sink: &'a dyn DeliverySink,
    pub params: &'a dyn ParameterSource,
    pub config: &'a PostProcConfig,
}

/// A plane together with the description of the stream it came from
pub(crate) struct ResolvedPlane<'b> {
    pub plane: &'b PlaneBuffer,
    pub info: StreamInfo,
}

/// Find the plane playing `role` in `buf` and look up its stream
pub(crate) fn resolve_plane<'b>(
    owner: &ChannelOwner,
    buf: &'b CapturedBuffer,
    role: BufferRole,
) -> Result<Option<ResolvedPlane<'b>>> {
    let Some(plane) = buf.find_by_role(role) else {
        return Ok(None);
    };
    let info = owner.stream_info(plane.stream_id).ok_or_else(|| {
        PostProcError::invalid(format!(
            "{} has no stream {}",
            owner.handle(),
            plane.stream_id
        ))
    })?;
    Ok(Some(ResolvedPlane { plane, info }))
}

/// Destination size of the main image: the crop when output crop is on, else the full frame
pub fn main_destination(info: &StreamInfo, output_crop: bool) -> Dimension {
    Dimension::new(
        if output_crop && info.crop.width != 0 {
            info.crop.width
        } else {
            info.dim.width
        },
        if output_crop && info.crop.height != 0 {
            info.crop.height
        } else {
            info.dim.height
        },
    )
}

/// Rotation the encoder applies; zero when the reprocess stage already rotated
pub fn encoder_rotation(settings: &CaptureSettings) -> u32 {
    if settings.rotation_applied_upstream {
        0
    } else {
        settings.rotation
    }
}

/// Thumbnail size, transposed for quarter turns the encoder still has to apply
pub fn thumbnail_destination(settings: &CaptureSettings) -> Dimension {
    if settings.is_quarter_turn() && !settings.rotation_applied_upstream {
        settings.thumbnail_size.transposed()
    } else {
        settings.thumbnail_size
    }
}

/// Session parameters derived from the main and thumbnail streams
pub fn session_config(
    main: &StreamInfo,
    thumb: Option<&StreamInfo>,
    settings: &CaptureSettings,
    config: &PostProcConfig,
) -> EncodeSessionConfig {
    let thumb_format = thumb.unwrap_or(main).format.jpeg_color_format();
    EncodeSessionConfig {
        main_dim: main.dim,
        main_format: main.format.jpeg_color_format(),
        thumbnail_dim: settings
            .thumbnail_needed()
            .then(|| thumbnail_destination(settings)),
        thumbnail_format: thumb_format,
        quality: settings.effective_quality(config.encode.default_quality),
        thumbnail_quality: settings.effective_thumbnail_quality(config.encode.default_quality),
        rotation: encoder_rotation(settings),
        burst: config.burst_enabled(),
        output_buffers: config.output_buffer_count(),
        output_buffer_len: main.offset.frame_len as usize,
    }
}

fn image_source(resolved: &ResolvedPlane<'_>, dst_dim: Dimension) -> EncodeImageSource {
    EncodeImageSource {
        data: resolved.plane.data.clone(),
        buf_index: resolved.plane.buf_index,
        format: resolved.info.format.jpeg_color_format(),
        src_dim: resolved.info.dim,
        offset: resolved.info.offset.clone(),
        crop: resolved.info.crop,
        dst_dim,
    }
}

fn send_raw_callbacks(sink: &dyn DeliverySink, main: &PlaneBuffer) {
    if sink.is_enabled(MessageType::RawImage) {
        let raw = Delivery::RawImage {
            index: 1,
            data: main.data.clone(),
        };
        if let Err(e) = sink.deliver(raw) {
            tracing::warn!("Raw image callback failed: {}", e);
        }
    }
    if sink.is_enabled(MessageType::RawImageNotify) {
        if let Err(e) = sink.deliver(Delivery::RawImageNotify) {
            tracing::warn!("Raw image notify failed: {}", e);
        }
    }
}

/// Build the descriptor for `job`, ensure a session and submit it.
///
/// On success the backend id is recorded on the job and returned.
pub fn build_and_dispatch(ctx: &BuildContext<'_>, job: &mut EncodeJob) -> Result<JobId> {
    let settings = ctx.params.settings();
    let exif = ctx.params.exif_data().map(Arc::new);

    let descriptor = {
        let owner = ctx.tracker.owner_of(&job.src)?;
        let main = resolve_plane(&owner, &job.src, BufferRole::Snapshot)?
            .ok_or_else(|| PostProcError::invalid("no snapshot plane in encode job"))?;

        let mut thumb = resolve_plane(&owner, &job.src, BufferRole::Thumbnail)?;
        if thumb.is_none() {
            if let Some(original) = &job.src_reproc {
                let original_owner = ctx.tracker.owner_of(original)?;
                thumb = resolve_plane(&original_owner, original, BufferRole::Thumbnail)?;
            }
        }
        if thumb.is_none() {
            tracing::trace!("Frame {} has no thumbnail plane", job.src.frame_number);
        }

        let main_dst = main_destination(&main.info, settings.output_crop);
        send_raw_callbacks(ctx.sink, main.plane);

        let session_cfg = session_config(
            &main.info,
            thumb.as_ref().map(|t| &t.info),
            &settings,
            ctx.config,
        );
        let session = ctx.session.ensure_session(&session_cfg)?;

        let thumbnail = settings.thumbnail_needed().then(|| {
            let source = thumb.as_ref().unwrap_or(&main);
            image_source(source, thumbnail_destination(&settings))
        });

        let metadata = job
            .src
            .find_by_role(BufferRole::Metadata)
            .or_else(|| {
                job.src_reproc
                    .as_ref()
                    .and_then(|b| b.find_by_role(BufferRole::Metadata))
            })
            .map(|p| p.data.clone());

        EncodeJobDescriptor {
            session,
            main: image_source(&main, main_dst),
            thumbnail,
            metadata,
            exif: exif.clone(),
            quality: session_cfg.quality,
            thumbnail_quality: session_cfg.thumbnail_quality,
            rotation: session_cfg.rotation,
            dst_index: if ctx.config.burst_enabled() {
                DstIndex::Auto
            } else {
                DstIndex::Slot(0)
            },
        }
    };

    tracing::debug!(
        "Submitting frame {} ({}x{} -> {}x{}, rotation {})",
        job.src.frame_number,
        descriptor.main.src_dim.width,
        descriptor.main.src_dim.height,
        descriptor.main.dst_dim.width,
        descriptor.main.dst_dim.height,
        descriptor.rotation
    );
    let id = ctx.session.start_job(descriptor)?;
    job.job_id = id;
    job.exif = exif;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::StreamId;
    use crate::types::{CropRect, FrameOffset, ImageFormat, StreamType};

    fn stream(dim: Dimension, crop: CropRect, format: ImageFormat) -> StreamInfo {
        StreamInfo {
            id: StreamId(1),
            stream_type: StreamType::Snapshot,
            original_type: None,
            dim,
            crop,
            offset: FrameOffset::semi_planar_420(dim),
            format,
            num_bufs: 1,
            buf_len: 0,
        }
    }

    #[test]
    fn test_main_destination_uses_crop_only_when_enabled() {
        let info = stream(
            Dimension::new(4000, 3000),
            CropRect::new(100, 50, 3800, 2900),
            ImageFormat::Nv21,
        );
        assert_eq!(main_destination(&info, false), Dimension::new(4000, 3000));
        assert_eq!(main_destination(&info, true), Dimension::new(3800, 2900));

        let uncropped = stream(Dimension::new(640, 480), CropRect::default(), ImageFormat::Nv21);
        assert_eq!(main_destination(&uncropped, true), Dimension::new(640, 480));
    }

    #[test]
    fn test_thumbnail_destination_swaps_for_encoder_rotation() {
        let mut settings = CaptureSettings {
            thumbnail_size: Dimension::new(320, 240),
            rotation: 90,
            ..Default::default()
        };
        assert_eq!(thumbnail_destination(&settings), Dimension::new(240, 320));
        assert_eq!(encoder_rotation(&settings), 90);

        settings.rotation_applied_upstream = true;
        assert_eq!(thumbnail_destination(&settings), Dimension::new(320, 240));
        assert_eq!(encoder_rotation(&settings), 0);

        settings.rotation_applied_upstream = false;
        settings.rotation = 180;
        assert_eq!(thumbnail_destination(&settings), Dimension::new(320, 240));
    }

    #[test]
    fn test_session_config() {
        let main = stream(Dimension::new(640, 480), CropRect::default(), ImageFormat::Nv12);
        let thumb = stream(Dimension::new(320, 240), CropRect::default(), ImageFormat::Nv61);
        let mut config = PostProcConfig::default();
        config.encode.jpeg_burst = true;
        let settings = CaptureSettings::default();

        let cfg = session_config(&main, Some(&thumb), &settings, &config);
        assert_eq!(cfg.main_format, crate::types::JpegColorFormat::CbCrH2V2);
        assert_eq!(cfg.thumbnail_format, crate::types::JpegColorFormat::CrCbH2V1);
        assert_eq!(cfg.quality, 85);
        assert!(cfg.burst);
        assert_eq!(cfg.output_buffers, 2);
        assert_eq!(cfg.output_buffer_len, 640 * 480 * 3 / 2);
        assert_eq!(cfg.thumbnail_dim, Some(Dimension::new(320, 240)));

        let no_thumb = CaptureSettings {
            thumbnail_size: Dimension::new(0, 0),
            jpeg_quality: 95,
            ..Default::default()
        };
        let cfg = session_config(&main, None, &no_thumb, &PostProcConfig::default());
        assert_eq!(cfg.thumbnail_dim, None);
        assert_eq!(cfg.quality, 95);
        assert_eq!(cfg.output_buffers, 1);
    }
}
