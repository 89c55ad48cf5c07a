//! Hand-off between the poller thread and the tokio runtime.
//!
//! The poller submits a [`RunRequest`] on a single-consumer queue owned by the
//! runtime and receives a crossbeam receiver it can block on with a deadline.
//! The executor holds a single-slot guard for the length of one run; a request
//! that arrives while the slot is taken is answered with [`RunOutcome::Skipped`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::types::RunStatus;
use futures::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Work executed once per trigger.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Run to completion. Failures are reported through the status.
    async fn run(&self) -> RunStatus;
}

/// What the poller learns about a submitted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunStatus),
    /// The job panicked.
    Failed(String),
    /// Another run held the slot.
    Skipped,
}

pub struct RunRequest {
    reply: crossbeam_channel::Sender<RunOutcome>,
}

/// Submitting side, cheap to clone and usable from any thread.
#[derive(Clone)]
pub struct Handoff {
    tx: mpsc::UnboundedSender<RunRequest>,
    slot: Arc<Mutex<()>>,
}

impl Handoff {
    /// Queue one run and return its completion handle.
    pub fn submit(&self) -> Result<crossbeam_channel::Receiver<RunOutcome>> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(RunRequest { reply })
            .map_err(|_| DaybreakError::Scheduling("run executor is gone".into()))?;
        Ok(rx)
    }

    /// Wait up to `limit` for an in-flight run to finish. Returns false when
    /// the run is still going at the deadline.
    pub async fn drain(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.slot.lock()).await.is_ok()
    }
}

/// Spawn the executor on the current runtime.
pub fn spawn_executor(job: Arc<dyn ScheduledJob>) -> (Handoff, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<RunRequest>();
    let slot = Arc::new(Mutex::new(()));
    let handoff = Handoff {
        tx,
        slot: slot.clone(),
    };

    let handle = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let permit = match slot.clone().try_lock_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!("⏭️ Run skipped: previous run still in flight");
                    let _ = request.reply.send(RunOutcome::Skipped);
                    continue;
                }
            };

            let job = job.clone();
            tokio::spawn(async move {
                let outcome = match AssertUnwindSafe(job.run()).catch_unwind().await {
                    Ok(status) => RunOutcome::Completed(status),
                    Err(panic) => RunOutcome::Failed(panic_message(&*panic)),
                };
                drop(permit);
                // The poller may have given up waiting; the run still counts.
                let _ = request.reply.send(outcome);
            });
        }
        tracing::debug!("Run executor stopped");
    });

    (handoff, handle)
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
