//! State shared by the workers and the encode completion handler.
//!
//! One [`Shared`] exists per `init`/`deinit` cycle. It is owned through an
//! `Arc` by the process worker, the save worker and the public
//! `PostProcessor` handle; the backend callback holds a `Weak` to it.

use crate::backend::encoder::{EncodeEvent, EncodeStatus};
use crate::backend::sink::{Delivery, DeliverySink, MessageType, Notification};
use crate::config::{ParameterSource, PostProcConfig};
use crate::error::{PostProcError, Result};
use crate::pipeline::command::{post, WorkerCommand};
use crate::pipeline::id::JobId;
use crate::pipeline::job_builder::BuildContext;
use crate::pipeline::jobs::{EncodeJob, SaveJob};
use crate::pipeline::queue::JobQueue;
use crate::pipeline::reprocess::ReprocessCoordinator;
use crate::pipeline::session::SessionManager;
use crate::pipeline::tracker::BufferTracker;
use crate::types::CapturedBuffer;
use bytes::Bytes;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) struct Shared {
    pub config: PostProcConfig,
    pub params: Arc<dyn ParameterSource>,
    pub tracker: Arc<BufferTracker>,
    pub session: SessionManager,
    pub reprocess: ReprocessCoordinator,
    pub sink: Arc<dyn DeliverySink>,

    pub input_encode: JobQueue<EncodeJob>,
    pub ongoing_encode: JobQueue<EncodeJob>,
    pub input_raw: JobQueue<CapturedBuffer>,
    pub input_reprocess: JobQueue<CapturedBuffer>,
    pub input_save: JobQueue<SaveJob>,

    /// Mirrors the process worker's state for callers on other threads
    pub active: AtomicBool,
    /// Serializes job submission against completion lookup
    dispatch_gate: Mutex<()>,
    save_index: AtomicU32,

    pub process_tx: Sender<WorkerCommand>,
    pub save_tx: Sender<WorkerCommand>,
}

impl Shared {
    pub fn new(
        config: PostProcConfig,
        params: Arc<dyn ParameterSource>,
        tracker: Arc<BufferTracker>,
        session: SessionManager,
        sink: Arc<dyn DeliverySink>,
        process_tx: Sender<WorkerCommand>,
        save_tx: Sender<WorkerCommand>,
    ) -> Self {
        let buffer_release = |name| {
            let tracker = Arc::clone(&tracker);
            JobQueue::new(name, move |buf: CapturedBuffer| tracker.release_logged(buf))
        };
        let job_release = |name| {
            let tracker = Arc::clone(&tracker);
            JobQueue::new(name, move |job: EncodeJob| job.release(&tracker))
        };

        Self {
            input_encode: job_release("input-encode"),
            ongoing_encode: job_release("ongoing-encode"),
            input_raw: buffer_release("input-raw"),
            input_reprocess: buffer_release("input-reprocess"),
            input_save: JobQueue::new("input-save", |_job: SaveJob| {}),
            reprocess: ReprocessCoordinator::new(Arc::clone(&tracker)),
            active: AtomicBool::new(false),
            dispatch_gate: Mutex::new(()),
            save_index: AtomicU32::new(0),
            config,
            params,
            tracker,
            session,
            sink,
            process_tx,
            save_tx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            tracker: &self.tracker,
            session: &self.session,
            sink: self.sink.as_ref(),
            params: self.params.as_ref(),
            config: &self.config,
        }
    }

    pub fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the ongoing encode job the backend knows as `id`
    pub fn take_ongoing(&self, id: JobId) -> Option<EncodeJob> {
        if !id.is_valid() {
            return None;
        }
        let _gate = self.lock_dispatch();
        self.ongoing_encode.take_first(|job| job.matches(id))
    }

    pub fn next_save_index(&self) -> u32 {
        self.save_index.fetch_add(1, Ordering::SeqCst)
    }

    pub fn wake_process(&self) {
        post(&self.process_tx, WorkerCommand::DoNextJob);
    }

    pub fn notify_shutter(&self) {
        self.sink.notify(Notification::Shutter);
    }

    pub fn notify_error(&self, err: &PostProcError) {
        tracing::error!("Capture failed: {}", err);
        self.sink.notify(Notification::Error {
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    /// Route a backend completion to the save worker or deliver it inline
    pub fn handle_encode_event(&self, event: EncodeEvent) {
        tracing::debug!("Encode completion for {} ({:?})", event.job_id, event.status);

        if self.config.save.longshot_save && self.params.settings().longshot {
            self.input_save.enqueue(SaveJob { event });
            post(&self.save_tx, WorkerCommand::DoNextJob);
        } else {
            match self.take_ongoing(event.job_id) {
                Some(job) => {
                    job.release(&self.tracker);
                    if let Err(e) = self.deliver_jpeg(&event) {
                        self.notify_error(&e);
                    }
                }
                None => tracing::debug!("No ongoing job for {}, ignoring", event.job_id),
            }
        }

        self.wake_process();
    }

    fn deliver_jpeg(&self, event: &EncodeEvent) -> Result<()> {
        if !self.sink.is_enabled(MessageType::CompressedImage) {
            tracing::debug!("Compressed image delivery disabled, dropping {}", event.job_id);
            return Ok(());
        }
        if event.status == EncodeStatus::Error {
            return Err(PostProcError::backend(format!(
                "encoder reported failure for {}",
                event.job_id
            )));
        }

        let mut payload = Vec::new();
        payload.try_reserve_exact(event.output.len())?;
        payload.extend_from_slice(&event.output);
        tracing::debug!("Delivering {} byte JPEG for {}", payload.len(), event.job_id);
        self.sink.deliver(Delivery::Jpeg(Bytes::from(payload)))
    }
}
