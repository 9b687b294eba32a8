//! Encode session lifecycle.
//!
//! One backend client is opened at `init` and closed at `deinit`. Within an
//! activation, a session is created lazily by the first job dispatched after
//! `start` and reused until `teardown`, which runs on `stop`.
//!
//! ```text
//! NoSession --ensure_session--> SessionActive --teardown--> NoSession
//! ```

use crate::backend::encoder::{EncodeBackend, EncodeCallback, EncodeJobDescriptor, EncodeSessionConfig};
use crate::error::{PostProcError, Result, ResultExt};
use crate::pipeline::id::{ClientHandle, JobId, SessionId};
use crate::types::Dimension;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Destination buffers kept alive for the lifetime of a session
#[derive(Debug)]
pub struct OutputPool {
    buffers: Vec<Vec<u8>>,
}

impl OutputPool {
    /// Allocate `count` buffers of `len` bytes, failing with `OutOfMemory`
    pub fn allocate(count: usize, len: usize) -> Result<Self> {
        let mut buffers = Vec::new();
        buffers.try_reserve_exact(count)?;
        for _ in 0..count {
            let mut buf = Vec::new();
            buf.try_reserve_exact(len)?;
            buf.resize(len, 0);
            buffers.push(buf);
        }
        Ok(Self { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffers.first().map_or(0, Vec::len)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    client: ClientHandle,
    session: SessionId,
    needs_new_session: bool,
    pool: Option<OutputPool>,
}

/// Owns the backend client and the current encode session
pub struct SessionManager {
    backend: Arc<dyn EncodeBackend>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn EncodeBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(SessionState {
                needs_new_session: true,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the backend client
    pub fn open(&self, max_dim: Dimension, on_event: EncodeCallback) -> Result<()> {
        let mut state = self.lock();
        if state.client.is_valid() {
            return Ok(());
        }
        state.client = self
            .backend
            .open(max_dim, on_event)
            .context("Opening encode backend")?;
        if !state.client.is_valid() {
            return Err(PostProcError::backend("backend returned an invalid client handle"));
        }
        tracing::info!("Encode backend opened: {}", state.client);
        Ok(())
    }

    /// Close the backend client, tearing down any live session first
    pub fn close(&self) -> Result<()> {
        self.teardown(std::iter::empty());
        let mut state = self.lock();
        let client = std::mem::take(&mut state.client);
        if client.is_valid() {
            self.backend.close(client).context("Closing encode backend")?;
            tracing::info!("Encode backend closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().client.is_valid()
    }

    /// Require a fresh session on the next dispatch
    pub fn mark_needs_new_session(&self) {
        self.lock().needs_new_session = true;
    }

    pub fn needs_new_session(&self) -> bool {
        self.lock().needs_new_session
    }

    pub fn session_id(&self) -> SessionId {
        self.lock().session
    }

    /// Number of destination buffers currently held (0 when no session)
    pub fn output_pool_len(&self) -> usize {
        self.lock().pool.as_ref().map_or(0, OutputPool::len)
    }

    /// Return the live session, creating it from `config` when needed.
    ///
    /// On failure the session stays absent and the next call retries.
    pub fn ensure_session(&self, config: &EncodeSessionConfig) -> Result<SessionId> {
        let mut state = self.lock();
        if !state.needs_new_session && state.session.is_valid() {
            return Ok(state.session);
        }
        if !state.client.is_valid() {
            return Err(PostProcError::NotInitialized);
        }
        let stale = std::mem::take(&mut state.session);
        if stale.is_valid() {
            if let Err(e) = self.backend.destroy_session(stale) {
                tracing::warn!("Failed to destroy stale {}: {}", stale, e);
            }
        }

        let pool = OutputPool::allocate(config.output_buffers, config.output_buffer_len)?;
        let session = self
            .backend
            .create_session(state.client, config)
            .context("Creating encode session")?;
        if !session.is_valid() {
            return Err(PostProcError::backend("backend returned an invalid session id"));
        }

        tracing::info!(
            "Encode session {} created ({}x{}, {} output buffer(s))",
            session,
            config.main_dim.width,
            config.main_dim.height,
            pool.len()
        );
        state.session = session;
        state.pool = Some(pool);
        state.needs_new_session = false;
        Ok(session)
    }

    pub fn start_job(&self, job: EncodeJobDescriptor) -> Result<JobId> {
        let id = self.backend.start_job(job).context("Starting encode job")?;
        if !id.is_valid() {
            return Err(PostProcError::backend("backend returned an invalid job id"));
        }
        Ok(id)
    }

    /// Abort `ongoing` jobs, then destroy the session and free the output pool
    pub fn teardown(&self, ongoing: impl IntoIterator<Item = JobId>) {
        for id in ongoing.into_iter().filter(|id| id.is_valid()) {
            if let Err(e) = self.backend.abort_job(id) {
                tracing::warn!("Failed to abort {}: {}", id, e);
            }
        }

        let mut state = self.lock();
        let session = std::mem::take(&mut state.session);
        if session.is_valid() {
            if let Err(e) = self.backend.destroy_session(session) {
                tracing::warn!("Failed to destroy {}: {}", session, e);
            } else {
                tracing::info!("Encode session {} destroyed", session);
            }
        }
        state.pool = None;
    }
}
