//! Delivery sink: where finished outputs and notifications go
//!
//! The sink stands in for the application layer. Data deliveries can be
//! individually enabled or disabled ([`MessageType`]); notifications such as
//! shutter and error events are always sent.

use crate::error::{ErrorKind, Result};
use bytes::Bytes;
use std::path::PathBuf;

/// Delivery categories the sink can enable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Uncompressed image data
    RawImage,
    /// Notification that raw data is ready (no payload)
    RawImageNotify,
    /// The final picture (JPEG, raw passthrough, or a saved file path)
    CompressedImage,
}

/// A data delivery to the application
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Uncompressed image data. `index` is 0 on the raw path and 1 on the encode path.
    RawImage { index: u32, data: Bytes },
    RawImageNotify,
    /// Encoded JPEG
    Jpeg(Bytes),
    /// Raw passthrough picture
    Raw(Bytes),
    /// Picture written to storage; remove the file if delivery fails and the flag is set
    SavedFile {
        path: PathBuf,
        unlink_on_failure: bool,
    },
}

impl Delivery {
    pub fn message_type(&self) -> MessageType {
        match self {
            Delivery::RawImage { .. } => MessageType::RawImage,
            Delivery::RawImageNotify => MessageType::RawImageNotify,
            Delivery::Jpeg(_) | Delivery::Raw(_) | Delivery::SavedFile { .. } => {
                MessageType::CompressedImage
            }
        }
    }
}

/// Asynchronous events for the application
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A capture was accepted; play the shutter sound
    Shutter,
    /// A capture failed after being accepted by the pipeline
    Error { kind: ErrorKind, message: String },
}

/// Application-side receiver of deliveries and notifications
pub trait DeliverySink: Send + Sync {
    fn is_enabled(&self, msg: MessageType) -> bool;

    /// Hand a delivery to the application
    fn deliver(&self, delivery: Delivery) -> Result<()>;

    fn notify(&self, notification: Notification);
}
