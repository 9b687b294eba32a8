//! Snapshot post-processing pipeline.
//!
//! Buffers flow from the capture controller through optional reprocessing to
//! the encode backend, and finished pictures go out through the delivery
//! sink. Two worker threads drive the pipeline: the process worker dispatches
//! queued work and the save worker persists long-shot pictures.
//!
//! # Architecture
//!
//! ```text
//! submit_captured ──► [input-reprocess] ──► ReprocessChannel
//!        │                                        │
//!        │                                submit_reprocessed
//!        ▼                                        ▼
//!   [input-raw] ◄──────────────────────── [input-encode]
//!        │                                        │ build_and_dispatch
//!        ▼                                        ▼
//!   raw delivery                      [ongoing-encode] ──► EncodeBackend
//!                                                               │
//!                                  DeliverySink ◄── completion ─┤
//!                                                               ▼
//!                                              [input-save] ──► file + path
//! ```
//!
//! # Design
//!
//! - **Move-only buffers**: [`CapturedBuffer`](crate::types::CapturedBuffer)
//!   has no `Clone`; every stage either forwards it or hands it to the
//!   [`BufferTracker`], so each buffer is returned exactly once.
//! - **Typed mailboxes**: workers block on a crossbeam channel of
//!   [`WorkerCommand`]s; `Stop` carries an acknowledgement sender.
//! - **Shared context**: queues, session and sink live in one `Arc` shared
//!   by both workers; the backend callback holds a `Weak` to it.

pub mod command;
mod context;
pub mod executor;
pub mod id;
pub mod job_builder;
pub mod jobs;
pub mod passthrough;
mod process_loop;
pub mod queue;
pub mod reprocess;
mod save_loop;
pub mod session;
pub mod tracker;

pub use command::WorkerCommand;
pub use executor::PostProcessor;
pub use id::{ChannelId, ClientHandle, JobId, SessionId, StreamId};
pub use jobs::{EncodeJob, ReprocessJob, SaveJob};
pub use queue::JobQueue;
pub use reprocess::ReprocessCoordinator;
pub use session::{OutputPool, SessionManager};
pub use tracker::{BufferTracker, ChannelOwner};
