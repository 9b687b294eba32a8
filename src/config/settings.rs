//! Per-capture runtime settings supplied by the host
//!
//! Unlike [`super::PostProcConfig`], these values may change between
//! captures (rotation, thumbnail size, longshot mode...). The pipeline reads
//! a fresh [`CaptureSettings`] snapshot from its [`ParameterSource`] every
//! time it makes a routing or encoding decision.
//!
//! # Main Types
//!
//! - [`CaptureSettings`] - Snapshot of the host's capture parameters
//! - [`ParameterSource`] - Host-side parameter store the pipeline reads from
//! - [`YuvFrameInfo`] - Frame layout published back to the host for YUV output
//! - [`SharedParameters`] - Lock-backed `ParameterSource` for hosts and tests

use crate::metadata::MetadataTable;
use crate::types::Dimension;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Capture parameters that influence routing and encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Captured buffers go through the reprocess channel before encoding
    pub reprocess: bool,
    /// The reprocess stage already applies rotation
    pub rotation_applied_upstream: bool,
    /// Picture format is plain YUV; deliver as raw instead of encoding
    pub yuv_passthrough: bool,
    /// Publish [`YuvFrameInfo`] before YUV passthrough delivery
    pub publish_yuv_frame_info: bool,
    /// JPEG rotation in degrees (0, 90, 180, 270)
    pub rotation: u32,
    /// Thumbnail size; a zero dimension disables the thumbnail
    pub thumbnail_size: Dimension,
    /// Main image quality; non-positive values use the configured default
    pub jpeg_quality: i32,
    /// Thumbnail quality; non-positive values use the configured default
    pub thumbnail_quality: i32,
    /// Encode the stream crop rather than the full frame
    pub output_crop: bool,
    /// Longshot (continuous burst) capture is active
    pub longshot: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            reprocess: false,
            rotation_applied_upstream: false,
            yuv_passthrough: false,
            publish_yuv_frame_info: false,
            rotation: 0,
            thumbnail_size: Dimension::new(320, 240),
            jpeg_quality: 0,
            thumbnail_quality: 0,
            output_crop: false,
            longshot: false,
        }
    }
}

impl CaptureSettings {
    pub fn thumbnail_needed(&self) -> bool {
        !self.thumbnail_size.is_zero()
    }

    pub fn is_quarter_turn(&self) -> bool {
        self.rotation % 180 == 90
    }

    /// Quality to encode with, falling back to `default` for unset values
    pub fn effective_quality(&self, default: u32) -> u32 {
        if self.jpeg_quality > 0 {
            self.jpeg_quality as u32
        } else {
            default
        }
    }

    pub fn effective_thumbnail_quality(&self, default: u32) -> u32 {
        if self.thumbnail_quality > 0 {
            self.thumbnail_quality as u32
        } else {
            default
        }
    }
}

/// Layout of a YUV snapshot frame, published before YUV passthrough
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvFrameInfo {
    pub frame_len: u32,
    pub y_offset: u32,
    pub cbcr_offset: u32,
    pub format: String,
}

/// Host-side parameter store
pub trait ParameterSource: Send + Sync {
    /// Current capture settings
    fn settings(&self) -> CaptureSettings;

    /// EXIF entries to attach to the next encode job
    fn exif_data(&self) -> Option<MetadataTable> {
        None
    }

    /// Receive the layout of a YUV frame about to be delivered
    fn publish_yuv_frame_info(&self, _info: &YuvFrameInfo) {}
}

/// `ParameterSource` backed by read-write locks
#[derive(Debug, Default)]
pub struct SharedParameters {
    settings: RwLock<CaptureSettings>,
    exif: RwLock<Option<MetadataTable>>,
    yuv_info: RwLock<Option<YuvFrameInfo>>,
}

impl SharedParameters {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            ..Default::default()
        }
    }

    /// Replace the capture settings
    pub fn set_settings(&self, settings: CaptureSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Apply an in-place change to the capture settings
    pub fn update(&self, f: impl FnOnce(&mut CaptureSettings)) {
        f(&mut self.settings.write().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn set_exif(&self, table: Option<MetadataTable>) {
        *self.exif.write().unwrap_or_else(PoisonError::into_inner) = table;
    }

    /// Last published YUV frame info
    pub fn yuv_frame_info(&self) -> Option<YuvFrameInfo> {
        self.yuv_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ParameterSource for SharedParameters {
    fn settings(&self) -> CaptureSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn exif_data(&self) -> Option<MetadataTable> {
        self.exif.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn publish_yuv_frame_info(&self, info: &YuvFrameInfo) {
        tracing::debug!(
            "YUV frame info: len={} yoff={} cbcroff={} fmt={}",
            info.frame_len,
            info.y_offset,
            info.cbcr_offset,
            info.format
        );
        *self.yuv_info.write().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;

    #[test]
    fn test_quality_fallback() {
        let mut settings = CaptureSettings::default();
        assert_eq!(settings.effective_quality(85), 85);
        settings.jpeg_quality = -3;
        assert_eq!(settings.effective_quality(85), 85);
        settings.jpeg_quality = 92;
        assert_eq!(settings.effective_quality(85), 92);
    }

    #[test]
    fn test_thumbnail_needed() {
        let mut settings = CaptureSettings::default();
        assert!(settings.thumbnail_needed());
        settings.thumbnail_size = Dimension::new(0, 0);
        assert!(!settings.thumbnail_needed());
    }

    #[test]
    fn test_quarter_turn() {
        let mut settings = CaptureSettings::default();
        for (rotation, expected) in [(0, false), (90, true), (180, false), (270, true)] {
            settings.rotation = rotation;
            assert_eq!(settings.is_quarter_turn(), expected, "rotation {}", rotation);
        }
    }

    #[test]
    fn test_shared_parameters() {
        let params = SharedParameters::new(CaptureSettings::default());
        params.update(|s| s.longshot = true);
        assert!(params.settings().longshot);

        assert!(params.exif_data().is_none());
        let mut table = MetadataTable::new();
        table.add(0x0112, MetadataValue::shorts(&[1]).unwrap()).unwrap();
        params.set_exif(Some(table));
        assert_eq!(params.exif_data().unwrap().len(), 1);

        let info = YuvFrameInfo {
            frame_len: 12,
            y_offset: 0,
            cbcr_offset: 0,
            format: "yuv420sp".into(),
        };
        params.publish_yuv_frame_info(&info);
        assert_eq!(params.yuv_frame_info(), Some(info));
    }
}
