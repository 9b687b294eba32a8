//! Worker mailbox commands.

use crate::error::{PostProcError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Completion signal for synchronous commands
#[derive(Debug)]
pub struct Acknowledge(Sender<()>);

impl Acknowledge {
    pub fn pair() -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(1);
        (Self(tx), rx)
    }

    pub fn done(self) {
        let _ = self.0.send(());
    }
}

/// Commands understood by the process and save workers
#[derive(Debug)]
pub enum WorkerCommand {
    /// Become active
    Start,
    /// Become inactive and drop all work; acknowledged when done
    Stop(Acknowledge),
    /// Look at the input queues again
    DoNextJob,
    /// Leave the worker loop
    Exit,
}

/// Send `Stop` and block until the worker acknowledges it
pub fn stop_and_wait(tx: &Sender<WorkerCommand>) -> Result<()> {
    let (ack, done) = Acknowledge::pair();
    tx.send(WorkerCommand::Stop(ack))
        .map_err(|_| PostProcError::Channel("worker mailbox closed".into()))?;
    done.recv()
        .map_err(|_| PostProcError::Channel("worker exited before acknowledging stop".into()))
}

/// Fire-and-forget send; a closed mailbox only means the worker is gone
pub fn post(tx: &Sender<WorkerCommand>, cmd: WorkerCommand) {
    if tx.send(cmd).is_err() {
        tracing::debug!("Worker mailbox closed, command dropped");
    }
}
