//! Fake collaborators for pipeline tests

use super::builders::{
    stream, CAMERA, OFFLINE_STREAM, PREVIEW_SIZE, PREVIEW_STREAM, REPROCESS, SNAPSHOT_SIZE,
    SNAPSHOT_STREAM, RAW_STREAM,
};
use bytes::Bytes;
use snapshot_postproc::backend::{
    Delivery, EncodeCallback, EncodeEvent, EncodeJobDescriptor, EncodeSessionConfig, MessageType,
    Notification,
};
use snapshot_postproc::pipeline::{ChannelId, ClientHandle, JobId, SessionId, StreamId};
use snapshot_postproc::{
    CaptureChannel, ChannelRegistry, DeliverySink, Dimension, EncodeBackend, ErrorKind,
    PostProcError, ReprocessChannel, Result, StreamInfo, StreamType,
};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ==================== Capture side ====================

/// Camera channel recording the frame numbers handed back to it
pub struct FakeCamera {
    returned: Mutex<Vec<u32>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            returned: Mutex::new(Vec::new()),
        }
    }

    pub fn returned(&self) -> Vec<u32> {
        self.returned.lock().unwrap().clone()
    }
}

impl CaptureChannel for FakeCamera {
    fn handle(&self) -> ChannelId {
        CAMERA
    }

    fn stream_info(&self, id: StreamId) -> Option<StreamInfo> {
        match id {
            SNAPSHOT_STREAM => Some(stream(id, StreamType::Snapshot, SNAPSHOT_SIZE)),
            PREVIEW_STREAM => Some(stream(id, StreamType::Preview, PREVIEW_SIZE)),
            RAW_STREAM => Some(stream(id, StreamType::Raw, SNAPSHOT_SIZE)),
            _ => None,
        }
    }

    fn buf_done(&self, buf: snapshot_postproc::CapturedBuffer) -> Result<()> {
        self.returned.lock().unwrap().push(buf.frame_number);
        Ok(())
    }
}

type OutputHook = Arc<dyn Fn(u32) + Send + Sync>;

/// Reprocess channel recording requests; outputs are injected by the test
pub struct FakeReprocess {
    requests: Mutex<Vec<u32>>,
    inline_output: Mutex<Option<OutputHook>>,
    returned: Mutex<Vec<u32>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_reprocess: AtomicBool,
}

impl FakeReprocess {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            inline_output: Mutex::new(None),
            returned: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_reprocess: AtomicBool::new(false),
        }
    }

    /// Run `hook` with the frame number from inside `do_reprocess`
    pub fn hand_back_inline(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.inline_output.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().unwrap().clone()
    }

    pub fn returned(&self) -> Vec<u32> {
        self.returned.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl CaptureChannel for FakeReprocess {
    fn handle(&self) -> ChannelId {
        REPROCESS
    }

    fn stream_info(&self, id: StreamId) -> Option<StreamInfo> {
        (id == OFFLINE_STREAM).then(|| {
            let mut info = stream(id, StreamType::Offline, SNAPSHOT_SIZE);
            info.original_type = Some(StreamType::Snapshot);
            info
        })
    }

    fn buf_done(&self, buf: snapshot_postproc::CapturedBuffer) -> Result<()> {
        self.returned.lock().unwrap().push(buf.frame_number);
        Ok(())
    }
}

impl ReprocessChannel for FakeReprocess {
    fn start(&self) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(PostProcError::Backend("reprocess start refused".into()));
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn do_reprocess(&self, buf: &snapshot_postproc::CapturedBuffer) -> Result<()> {
        if self.fail_reprocess.load(Ordering::SeqCst) {
            return Err(PostProcError::Backend("reprocess refused".into()));
        }
        self.requests.lock().unwrap().push(buf.frame_number);
        let hook = self.inline_output.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(buf.frame_number);
        }
        Ok(())
    }
}

/// Registry with one camera and an optional reprocess channel to hand out
pub struct FakeRegistry {
    camera: Arc<FakeCamera>,
    reprocess: Option<Arc<FakeReprocess>>,
}

impl FakeRegistry {
    pub fn new(camera: Arc<FakeCamera>, reprocess: Option<Arc<FakeReprocess>>) -> Self {
        Self { camera, reprocess }
    }
}

impl ChannelRegistry for FakeRegistry {
    fn channel_by_handle(&self, id: ChannelId) -> Option<Arc<dyn CaptureChannel>> {
        (id == CAMERA).then(|| self.camera.clone() as Arc<dyn CaptureChannel>)
    }

    fn add_reprocess_channel(
        &self,
        _source: &Arc<dyn CaptureChannel>,
    ) -> Option<Arc<dyn ReprocessChannel>> {
        self.reprocess
            .as_ref()
            .map(|r| r.clone() as Arc<dyn ReprocessChannel>)
    }
}

// ==================== Encode backend ====================

#[derive(Default)]
struct BackendLog {
    on_event: Option<EncodeCallback>,
    sessions_created: Vec<SessionId>,
    sessions_destroyed: Vec<SessionId>,
    started: Vec<(JobId, EncodeJobDescriptor)>,
    aborted: Vec<JobId>,
    session_configs: Vec<EncodeSessionConfig>,
    closed: usize,
    fail_sessions: usize,
    fail_jobs: usize,
}

/// Encode backend whose completions are fired by the test
pub struct ScriptedBackend {
    log: Mutex<BackendLog>,
    next_id: AtomicU32,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(BackendLog::default()),
            next_id: AtomicU32::new(100),
        }
    }

    /// Fail the next `n` session creations
    pub fn fail_next_sessions(&self, n: usize) {
        self.log.lock().unwrap().fail_sessions = n;
    }

    /// Fail the next `n` job submissions
    pub fn fail_next_jobs(&self, n: usize) {
        self.log.lock().unwrap().fail_jobs = n;
    }

    pub fn started_ids(&self) -> Vec<JobId> {
        self.log.lock().unwrap().started.iter().map(|(id, _)| *id).collect()
    }

    pub fn started_count(&self) -> usize {
        self.log.lock().unwrap().started.len()
    }

    pub fn descriptor(&self, index: usize) -> EncodeJobDescriptor {
        self.log.lock().unwrap().started[index].1.clone()
    }

    pub fn session_configs(&self) -> Vec<EncodeSessionConfig> {
        self.log.lock().unwrap().session_configs.clone()
    }

    pub fn sessions_created(&self) -> Vec<SessionId> {
        self.log.lock().unwrap().sessions_created.clone()
    }

    pub fn sessions_destroyed(&self) -> Vec<SessionId> {
        self.log.lock().unwrap().sessions_destroyed.clone()
    }

    pub fn aborted(&self) -> Vec<JobId> {
        self.log.lock().unwrap().aborted.clone()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    /// Fire a completion from the calling thread
    pub fn complete(&self, event: EncodeEvent) {
        let callback = self.log.lock().unwrap().on_event.clone();
        let callback = callback.expect("backend not opened");
        callback(event);
    }

    pub fn complete_ok(&self, id: JobId, payload: &'static [u8]) {
        self.complete(EncodeEvent::done(id, Bytes::from_static(payload)));
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl EncodeBackend for ScriptedBackend {
    fn open(&self, _max_dim: Dimension, on_event: EncodeCallback) -> Result<ClientHandle> {
        self.log.lock().unwrap().on_event = Some(on_event);
        Ok(ClientHandle(self.next_id()))
    }

    fn create_session(
        &self,
        _client: ClientHandle,
        config: &EncodeSessionConfig,
    ) -> Result<SessionId> {
        let mut log = self.log.lock().unwrap();
        if log.fail_sessions > 0 {
            log.fail_sessions -= 1;
            return Err(PostProcError::Backend("session refused".into()));
        }
        let id = SessionId(self.next_id());
        log.sessions_created.push(id);
        log.session_configs.push(config.clone());
        Ok(id)
    }

    fn start_job(&self, job: EncodeJobDescriptor) -> Result<JobId> {
        let mut log = self.log.lock().unwrap();
        if log.fail_jobs > 0 {
            log.fail_jobs -= 1;
            return Err(PostProcError::Backend("job refused".into()));
        }
        let id = JobId(self.next_id());
        log.started.push((id, job));
        Ok(id)
    }

    fn abort_job(&self, job: JobId) -> Result<()> {
        self.log.lock().unwrap().aborted.push(job);
        Ok(())
    }

    fn destroy_session(&self, session: SessionId) -> Result<()> {
        self.log.lock().unwrap().sessions_destroyed.push(session);
        Ok(())
    }

    fn close(&self, _client: ClientHandle) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ==================== Delivery sink ====================

/// Sink recording every delivery and notification
pub struct RecordingSink {
    disabled: Mutex<HashSet<MessageType>>,
    deliveries: Mutex<VecDeque<Delivery>>,
    notifications: Mutex<Vec<Notification>>,
    pub fail_deliveries: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            disabled: Mutex::new(HashSet::new()),
            deliveries: Mutex::new(VecDeque::new()),
            notifications: Mutex::new(Vec::new()),
            fail_deliveries: AtomicBool::new(false),
        }
    }

    pub fn disable(&self, msg: MessageType) {
        self.disabled.lock().unwrap().insert(msg);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().iter().cloned().collect()
    }

    pub fn jpegs(&self) -> Vec<Bytes> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Jpeg(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn raws(&self) -> Vec<Bytes> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Raw(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn saved_files(&self) -> Vec<PathBuf> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::SavedFile { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn raw_image_indices(&self) -> Vec<u32> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::RawImage { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notification::Error { kind, .. } => Some(*kind),
                Notification::Shutter => None,
            })
            .collect()
    }

    pub fn shutters(&self) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notification::Shutter))
            .count()
    }
}

impl DeliverySink for RecordingSink {
    fn is_enabled(&self, msg: MessageType) -> bool {
        !self.disabled.lock().unwrap().contains(&msg)
    }

    fn deliver(&self, delivery: Delivery) -> Result<()> {
        if self.fail_deliveries.load(Ordering::SeqCst) {
            return Err(PostProcError::InvalidArgument("application rejected delivery".into()));
        }
        self.deliveries.lock().unwrap().push_back(delivery);
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}
