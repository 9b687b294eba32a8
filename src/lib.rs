//! # snapshot-postproc: asynchronous snapshot post-processing
//!
//! Turns raw captured sensor buffers into delivered JPEG (or raw) pictures.
//! The pipeline sits between a capture source and a session-based JPEG encode
//! backend, with an optional reprocessing stage in between, and guarantees
//! that every hardware buffer it accepts is returned to its channel exactly
//! once.
//!
//! ## Architecture
//!
//! - **Backend interfaces**: capture channels, reprocess channels, the encode
//!   backend and the delivery sink are traits ([`backend`])
//! - **Pipeline**: job queues, buffer tracking, session management and the
//!   two worker threads ([`pipeline`])
//! - **Metadata**: EXIF-style tagged value table ([`metadata`])
//! - **Communication**: crossbeam channels between the controller and the workers
//!
//! ## Configuration
//!
//! Static settings are read from `postproc.toml` in the platform data
//! directory under `dev.hxyulin.snapshot-postproc` (see [`config`]). Per-capture
//! settings come from the host through a [`config::ParameterSource`].
//!
//! ## Example
//!
//! ```ignore
//! use snapshot_postproc::{
//!     backend::SoftwareJpegBackend,
//!     config::{CaptureSettings, PostProcConfig, SharedParameters},
//!     PostProcessor,
//! };
//!
//! let params = Arc::new(SharedParameters::new(CaptureSettings::default()));
//! let mut post = PostProcessor::new(
//!     PostProcConfig::default(),
//!     params,
//!     registry,
//!     Arc::new(SoftwareJpegBackend::new()),
//! );
//! post.init(sink)?;
//! post.start(channel)?;
//! post.submit_captured(buffer)?;
//! post.stop()?;
//! post.deinit();
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use backend::{CaptureChannel, ChannelRegistry, DeliverySink, EncodeBackend, ReprocessChannel};
pub use config::{CaptureSettings, ParameterSource, PostProcConfig, SharedParameters};
pub use error::{ErrorKind, PostProcError, Result};
pub use metadata::{MetadataTable, MetadataValue};
pub use pipeline::PostProcessor;
pub use types::{BufferRole, CapturedBuffer, Dimension, ImageFormat, PlaneBuffer, StreamInfo, StreamType};
