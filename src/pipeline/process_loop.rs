//! The process worker.
//!
//! Owns dispatch: it pulls from the encode, raw and reprocess input queues
//! whenever it is woken with [`WorkerCommand::DoNextJob`], and performs the
//! ordered teardown on [`WorkerCommand::Stop`].

use crate::pipeline::command::{post, stop_and_wait, Acknowledge, WorkerCommand};
use crate::pipeline::context::Shared;
use crate::pipeline::job_builder::build_and_dispatch;
use crate::pipeline::passthrough::process_raw;
use crossbeam_channel::Receiver;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Inactive,
    Active,
}

pub(crate) struct ProcessWorker {
    shared: Arc<Shared>,
    commands: Receiver<WorkerCommand>,
    state: WorkerState,
}

impl ProcessWorker {
    pub fn new(shared: Arc<Shared>, commands: Receiver<WorkerCommand>) -> Self {
        Self {
            shared,
            commands,
            state: WorkerState::Inactive,
        }
    }

    pub fn run(&mut self) {
        tracing::info!("Process worker started");
        while let Ok(cmd) = self.commands.recv() {
            match cmd {
                WorkerCommand::Start => self.start(),
                WorkerCommand::Stop(ack) => self.stop(ack),
                WorkerCommand::DoNextJob => self.do_next_job(),
                WorkerCommand::Exit => break,
            }
        }
        tracing::info!("Process worker stopped");
    }

    fn start(&mut self) {
        self.state = WorkerState::Active;
        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.session.mark_needs_new_session();
        post(&self.shared.save_tx, WorkerCommand::Start);
        tracing::debug!("Process worker active");
    }

    fn stop(&mut self, ack: Acknowledge) {
        let shared = &self.shared;
        self.state = WorkerState::Inactive;
        shared.active.store(false, Ordering::SeqCst);

        if let Err(e) = stop_and_wait(&shared.save_tx) {
            tracing::warn!("Save worker did not acknowledge stop: {}", e);
        }

        let ongoing = {
            let _gate = shared.lock_dispatch();
            std::iter::from_fn(|| shared.ongoing_encode.dequeue(false)).collect::<Vec<_>>()
        };
        shared.session.teardown(ongoing.iter().map(|job| job.job_id));
        let aborted = ongoing.len();
        for job in ongoing {
            job.release(&shared.tracker);
        }

        // Reprocess-owned buffers only resolve while the channel is attached
        let flushed = shared.reprocess.flush()
            + shared.input_encode.flush()
            + shared.input_reprocess.flush()
            + shared.input_raw.flush();
        shared.reprocess.stop();

        tracing::info!(
            "Pipeline stopped ({} encode job(s) aborted, {} queued item(s) released)",
            aborted,
            flushed
        );
        ack.done();
    }

    fn do_next_job(&mut self) {
        if self.state == WorkerState::Inactive {
            self.drain_inactive();
            return;
        }

        self.dispatch_encode();
        self.dispatch_raw();
        self.dispatch_reprocess();
    }

    fn drain_inactive(&self) {
        let shared = &self.shared;
        if let Some(job) = shared.input_encode.dequeue(false) {
            tracing::debug!("Releasing frame {} (inactive)", job.src.frame_number);
            job.release(&shared.tracker);
        }
        for queue in [&shared.input_raw, &shared.input_reprocess] {
            if let Some(buf) = queue.dequeue(false) {
                tracing::debug!("Releasing frame {} from {} (inactive)", buf.frame_number, queue.name());
                shared.tracker.release_logged(buf);
            }
        }
    }

    fn dispatch_encode(&self) {
        let shared = &self.shared;
        let limit = shared.config.encode.max_outstanding_jobs.max(1);
        if shared.ongoing_encode.len() >= limit {
            return;
        }
        let Some(mut job) = shared.input_encode.dequeue(false) else {
            return;
        };

        let gate = shared.lock_dispatch();
        match build_and_dispatch(&shared.build_context(), &mut job) {
            Ok(id) => {
                tracing::debug!("Frame {} dispatched as {}", job.src.frame_number, id);
                shared.ongoing_encode.enqueue(job);
            }
            Err(e) => {
                job.release(&shared.tracker);
                shared.notify_error(&e.with_context("Dispatching encode job"));
            }
        }
        drop(gate);

        // Wake-ups spent while at the cap are not replayed by completions
        if !shared.input_encode.is_empty() && shared.ongoing_encode.len() < limit {
            shared.wake_process();
        }
    }

    fn dispatch_raw(&self) {
        let shared = &self.shared;
        let Some(buf) = shared.input_raw.dequeue(false) else {
            return;
        };
        shared.notify_shutter();
        if let Err(e) = process_raw(&shared.tracker, shared.sink.as_ref(), buf) {
            shared.notify_error(&e);
        }
    }

    fn dispatch_reprocess(&self) {
        let shared = &self.shared;
        let Some(buf) = shared.input_reprocess.dequeue(false) else {
            return;
        };
        if let Err(e) = shared.reprocess.submit(buf) {
            shared.notify_error(&e);
        }
    }
}
