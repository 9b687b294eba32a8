//! Error handling for the post-processing pipeline
//!
//! This module defines the pipeline error type, a Result alias used across
//! the crate, and the coarse [`ErrorKind`] carried by error notifications.

use thiserror::Error;

/// Main error type for post-processing operations
#[derive(Error, Debug)]
pub enum PostProcError {
    /// A pipeline method was called before `init`
    #[error("Post-processor not initialized")]
    NotInitialized,

    /// Missing mandatory buffer, unresolved channel id, malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation failure for jobs, delivery buffers or metadata arrays
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The encode backend reported a failure
    #[error("Encode backend failure: {0}")]
    Backend(String),

    /// A required external resource (e.g. a reprocess channel) could not be obtained
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker mailbox was closed
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PostProcError>,
    },
}

/// Coarse classification of a failure, as surfaced to the delivery sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotInitialized,
    InvalidArgument,
    OutOfMemory,
    Backend,
    ResourceUnavailable,
    Other,
}

impl PostProcError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PostProcError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error, looking through any context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            PostProcError::NotInitialized => ErrorKind::NotInitialized,
            PostProcError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            PostProcError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            PostProcError::Backend(_) => ErrorKind::Backend,
            PostProcError::ResourceUnavailable(_) => ErrorKind::ResourceUnavailable,
            PostProcError::WithContext { source, .. } => source.kind(),
            PostProcError::Config(_) | PostProcError::Channel(_) | PostProcError::Io(_) => {
                ErrorKind::Other
            }
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PostProcError::InvalidArgument(msg.into())
    }

    pub(crate) fn backend(msg: impl Into<String>) -> Self {
        PostProcError::Backend(msg.into())
    }
}

impl From<std::collections::TryReserveError> for PostProcError {
    fn from(err: std::collections::TryReserveError) -> Self {
        PostProcError::OutOfMemory(err.to_string())
    }
}

/// Result type alias for post-processing operations
pub type Result<T> = std::result::Result<T, PostProcError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
