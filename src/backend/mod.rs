//! External collaborator interfaces
//!
//! The post-processor sits between three external components, each reached
//! through a trait so hosts (and tests) can plug in their own:
//!
//! - [`CaptureChannel`] / [`ReprocessChannel`] / [`ChannelRegistry`] - sources of
//!   captured buffers and the place they are returned to
//! - [`EncodeBackend`] - session-based JPEG encoder with asynchronous completion
//! - [`DeliverySink`] - the application layer receiving pictures and notifications
//!
//! # Components
//!
//! - [`SoftwareJpegBackend`] - pure-Rust encoder for running without hardware
//!   (feature `software-encoder`)

pub mod capture;
pub mod encoder;
pub mod sink;
#[cfg(feature = "software-encoder")]
pub mod software;

pub use capture::{CaptureChannel, ChannelRegistry, ReprocessChannel};
pub use encoder::{
    DstIndex, EncodeBackend, EncodeCallback, EncodeEvent, EncodeImageSource, EncodeJobDescriptor,
    EncodeSessionConfig, EncodeStatus,
};
pub use sink::{Delivery, DeliverySink, MessageType, Notification};
#[cfg(feature = "software-encoder")]
pub use software::SoftwareJpegBackend;
