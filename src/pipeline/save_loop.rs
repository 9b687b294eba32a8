//! The save worker.
//!
//! Used for long-shot captures when saving is configured: encode completions
//! are written to storage here instead of being delivered inline, and the
//! file path is delivered in their place.

use crate::backend::encoder::{EncodeEvent, EncodeStatus};
use crate::backend::sink::Delivery;
use crate::error::{PostProcError, Result, ResultExt};
use crate::pipeline::command::{Acknowledge, WorkerCommand};
use crate::pipeline::context::Shared;
use crossbeam_channel::Receiver;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub(crate) struct SaveWorker {
    shared: Arc<Shared>,
    commands: Receiver<WorkerCommand>,
    active: bool,
}

impl SaveWorker {
    pub fn new(shared: Arc<Shared>, commands: Receiver<WorkerCommand>) -> Self {
        Self {
            shared,
            commands,
            active: false,
        }
    }

    pub fn run(&mut self) {
        tracing::info!("Save worker started");
        while let Ok(cmd) = self.commands.recv() {
            match cmd {
                WorkerCommand::Start => self.active = true,
                WorkerCommand::Stop(ack) => self.stop(ack),
                WorkerCommand::DoNextJob => self.save_next(),
                WorkerCommand::Exit => break,
            }
        }
        tracing::info!("Save worker stopped");
    }

    fn stop(&mut self, ack: Acknowledge) {
        self.active = false;
        let dropped = self.shared.input_save.flush();
        if dropped > 0 {
            tracing::debug!("Dropped {} pending save job(s)", dropped);
        }
        ack.done();
    }

    fn save_next(&mut self) {
        let shared = &self.shared;
        let Some(save) = shared.input_save.dequeue(false) else {
            return;
        };

        match shared.take_ongoing(save.event.job_id) {
            Some(job) => {
                job.release(&shared.tracker);
                if self.active {
                    if let Err(e) = self.persist(&save.event) {
                        shared.notify_error(&e);
                    }
                }
            }
            None => tracing::debug!("No ongoing job for {}, nothing to save", save.event.job_id),
        }

        shared.wake_process();
    }

    fn persist(&self, event: &EncodeEvent) -> Result<()> {
        if event.status == EncodeStatus::Error {
            return Err(PostProcError::backend(format!(
                "encoder reported failure for {}",
                event.job_id
            )));
        }

        let index = self.shared.next_save_index();
        let path = self.shared.config.save.file_path(index);
        write_picture(&path, &event.output)?;
        tracing::debug!("Saved {} bytes to {}", event.output.len(), path.display());

        let delivery = Delivery::SavedFile {
            path: path.clone(),
            unlink_on_failure: true,
        };
        if let Err(e) = self.shared.sink.deliver(delivery) {
            if let Err(rm) = fs::remove_file(&path) {
                tracing::warn!("Failed to remove {}: {}", path.display(), rm);
            }
            return Err(e);
        }
        Ok(())
    }
}

fn write_picture(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(PostProcError::from)
            .with_context(|| format!("Creating {}", dir.display()))?;
    }
    fs::write(path, data)
        .map_err(PostProcError::from)
        .with_context(|| format!("Writing {}", path.display()))
}
