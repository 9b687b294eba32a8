//! The post-processor handle exposed to the capture controller.
//!
//! [`PostProcessor`] owns the two worker threads and the [`Shared`] context
//! for one `init`/`deinit` cycle, and classifies every submitted buffer into
//! the reprocess, raw or encode path.
//!
//! ```text
//!            submit_captured
//!                  │
//!     ┌────────────┼──────────────┐
//!     ▼            ▼              ▼
//! reprocess      raw path      encode path
//!     │            ▲              ▲
//!     └─ submit_reprocessed ──────┘
//! ```

use crate::backend::capture::{CaptureChannel, ChannelRegistry};
use crate::backend::encoder::{EncodeBackend, EncodeCallback, EncodeEvent};
use crate::backend::sink::DeliverySink;
use crate::config::{ParameterSource, PostProcConfig};
use crate::error::{PostProcError, Result};
use crate::pipeline::command::{post, stop_and_wait, WorkerCommand};
use crate::pipeline::context::Shared;
use crate::pipeline::id::SessionId;
use crate::pipeline::jobs::EncodeJob;
use crate::pipeline::passthrough::yuv_frame_info;
use crate::pipeline::process_loop::ProcessWorker;
use crate::pipeline::save_loop::SaveWorker;
use crate::pipeline::session::SessionManager;
use crate::pipeline::tracker::BufferTracker;
use crate::types::CapturedBuffer;
use crossbeam_channel::unbounded;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

struct Runtime {
    shared: Arc<Shared>,
    process: JoinHandle<()>,
    save: JoinHandle<()>,
}

/// Asynchronous snapshot post-processor
pub struct PostProcessor {
    config: PostProcConfig,
    params: Arc<dyn ParameterSource>,
    backend: Arc<dyn EncodeBackend>,
    tracker: Arc<BufferTracker>,
    runtime: Option<Runtime>,
}

impl PostProcessor {
    pub fn new(
        config: PostProcConfig,
        params: Arc<dyn ParameterSource>,
        registry: Arc<dyn ChannelRegistry>,
        backend: Arc<dyn EncodeBackend>,
    ) -> Self {
        Self {
            config,
            params,
            backend,
            tracker: Arc::new(BufferTracker::new(registry)),
            runtime: None,
        }
    }

    /// Open the encode backend and spawn the workers. Calling it twice is a no-op.
    pub fn init(&mut self, sink: Arc<dyn DeliverySink>) -> Result<()> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let (process_tx, process_rx) = unbounded();
        let (save_tx, save_rx) = unbounded();
        let shared = Arc::new(Shared::new(
            self.config.clone(),
            Arc::clone(&self.params),
            Arc::clone(&self.tracker),
            SessionManager::new(Arc::clone(&self.backend)),
            sink,
            process_tx,
            save_tx,
        ));

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let on_event: EncodeCallback = Arc::new(move |event: EncodeEvent| match weak.upgrade() {
            Some(shared) => shared.handle_encode_event(event),
            None => tracing::debug!("Completion for {} after deinit", event.job_id),
        });
        shared
            .session
            .open(self.config.encode.max_picture_size, on_event)?;

        let mut process = ProcessWorker::new(Arc::clone(&shared), process_rx);
        let process = match std::thread::Builder::new()
            .name("postproc-process".into())
            .spawn(move || process.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(close) = shared.session.close() {
                    tracing::warn!("Closing encode backend: {}", close);
                }
                return Err(e.into());
            }
        };

        let mut save = SaveWorker::new(Arc::clone(&shared), save_rx);
        let save = match std::thread::Builder::new()
            .name("postproc-save".into())
            .spawn(move || save.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                post(&shared.process_tx, WorkerCommand::Exit);
                let _ = process.join();
                if let Err(close) = shared.session.close() {
                    tracing::warn!("Closing encode backend: {}", close);
                }
                return Err(e.into());
            }
        };

        tracing::info!("Post-processor initialized");
        self.runtime = Some(Runtime {
            shared,
            process,
            save,
        });
        Ok(())
    }

    /// Stop, join the workers and close the backend
    pub fn deinit(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        if let Err(e) = stop_and_wait(&runtime.shared.process_tx) {
            tracing::warn!("Stop during deinit failed: {}", e);
        }

        post(&runtime.shared.process_tx, WorkerCommand::Exit);
        post(&runtime.shared.save_tx, WorkerCommand::Exit);
        if runtime.process.join().is_err() {
            tracing::error!("Process worker panicked");
        }
        if runtime.save.join().is_err() {
            tracing::error!("Save worker panicked");
        }

        if let Err(e) = runtime.shared.session.close() {
            tracing::warn!("Closing encode backend: {}", e);
        }
        tracing::info!("Post-processor deinitialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.runtime.is_some()
    }

    fn shared(&self) -> Result<&Arc<Shared>> {
        self.runtime
            .as_ref()
            .map(|rt| &rt.shared)
            .ok_or(PostProcError::NotInitialized)
    }

    /// Begin accepting buffers captured on `source`
    pub fn start(&self, source: Arc<dyn CaptureChannel>) -> Result<()> {
        let shared = self.shared()?;
        if self.params.settings().reprocess {
            if let Err(e) = shared.reprocess.start(&source) {
                shared.notify_error(&e);
                return Err(e);
            }
        }
        shared.active.store(true, Ordering::SeqCst);
        post(&shared.process_tx, WorkerCommand::Start);
        tracing::info!("Post-processor started on {}", source.handle());
        Ok(())
    }

    /// Abort in-flight work and release every held buffer. Blocks until done.
    pub fn stop(&self) -> Result<()> {
        let shared = self.shared()?;
        stop_and_wait(&shared.process_tx)
    }

    /// Route a freshly captured buffer into the pipeline
    pub fn submit_captured(&self, buf: CapturedBuffer) -> Result<()> {
        let Some(shared) = self.accepting() else {
            return self.reject(buf);
        };
        let settings = self.params.settings();

        if settings.reprocess {
            if !settings.longshot {
                shared.notify_shutter();
            }
            tracing::debug!("Frame {} queued for reprocess", buf.frame_number);
            shared.input_reprocess.enqueue(buf);
        } else if settings.yuv_passthrough {
            if settings.publish_yuv_frame_info {
                self.publish_yuv_info(shared, &buf);
            }
            tracing::debug!("Frame {} queued for raw passthrough", buf.frame_number);
            shared.input_raw.enqueue(buf);
        } else {
            if !settings.longshot {
                shared.notify_shutter();
            }
            tracing::debug!("Frame {} queued for encode", buf.frame_number);
            shared.input_encode.enqueue(EncodeJob::new(buf));
        }

        shared.wake_process();
        Ok(())
    }

    /// Route a buffer straight to raw passthrough
    pub fn submit_raw(&self, buf: CapturedBuffer) -> Result<()> {
        let Some(shared) = self.accepting() else {
            return self.reject(buf);
        };
        tracing::debug!("Frame {} queued for raw passthrough", buf.frame_number);
        shared.input_raw.enqueue(buf);
        shared.wake_process();
        Ok(())
    }

    /// Accept the output of the reprocess channel for a previously submitted frame
    pub fn submit_reprocessed(&self, buf: CapturedBuffer) -> Result<()> {
        let Some(shared) = self.accepting() else {
            return self.reject(buf);
        };

        let Some(job) = shared.reprocess.take_matching(&buf) else {
            let frame = buf.frame_number;
            self.tracker.release_logged(buf);
            return Err(PostProcError::invalid(format!(
                "no ongoing reprocess for frame {}",
                frame
            )));
        };

        let settings = self.params.settings();
        if settings.yuv_passthrough {
            job.release(&self.tracker);
            if settings.publish_yuv_frame_info {
                self.publish_yuv_info(shared, &buf);
            }
            tracing::debug!("Reprocessed frame {} queued for raw passthrough", buf.frame_number);
            shared.input_raw.enqueue(buf);
        } else {
            if settings.longshot {
                shared.notify_shutter();
            }
            tracing::debug!("Reprocessed frame {} queued for encode", buf.frame_number);
            shared
                .input_encode
                .enqueue(EncodeJob::reprocessed(buf, job.src));
        }

        shared.wake_process();
        Ok(())
    }

    /// Feed a backend completion event into the pipeline
    pub fn on_encode_event(&self, event: EncodeEvent) -> Result<()> {
        self.shared()?.handle_encode_event(event);
        Ok(())
    }

    /// Shared context if buffers are currently accepted
    fn accepting(&self) -> Option<&Arc<Shared>> {
        self.runtime
            .as_ref()
            .map(|rt| &rt.shared)
            .filter(|shared| shared.is_active())
    }

    /// Return a buffer that cannot be accepted. Only an uninitialized pipeline is an error.
    fn reject(&self, buf: CapturedBuffer) -> Result<()> {
        tracing::debug!("Releasing frame {}: pipeline not active", buf.frame_number);
        self.tracker.release_logged(buf);
        if self.runtime.is_some() {
            Ok(())
        } else {
            Err(PostProcError::NotInitialized)
        }
    }

    fn publish_yuv_info(&self, shared: &Shared, buf: &CapturedBuffer) {
        match yuv_frame_info(&shared.tracker, buf) {
            Ok(info) => self.params.publish_yuv_frame_info(&info),
            Err(e) => tracing::warn!("Cannot describe frame {}: {}", buf.frame_number, e),
        }
    }

    // ==================== Diagnostics ====================

    pub fn is_active(&self) -> bool {
        self.runtime.as_ref().is_some_and(|rt| rt.shared.is_active())
    }

    /// Encode jobs submitted to the backend and not yet completed
    pub fn ongoing_encode_len(&self) -> usize {
        self.runtime
            .as_ref()
            .map_or(0, |rt| rt.shared.ongoing_encode.len())
    }

    /// Buffers handed to the reprocess channel and not yet returned
    pub fn ongoing_reprocess_len(&self) -> usize {
        self.runtime
            .as_ref()
            .map_or(0, |rt| rt.shared.reprocess.ongoing_len())
    }

    /// Items waiting in the encode, raw and reprocess input queues
    pub fn pending_len(&self) -> usize {
        self.runtime.as_ref().map_or(0, |rt| {
            rt.shared.input_encode.len() + rt.shared.input_raw.len() + rt.shared.input_reprocess.len()
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.runtime
            .as_ref()
            .map_or(SessionId::INVALID, |rt| rt.shared.session.session_id())
    }

    pub fn tracker(&self) -> &Arc<BufferTracker> {
        &self.tracker
    }
}

impl Drop for PostProcessor {
    fn drop(&mut self) {
        self.deinit();
    }
}
