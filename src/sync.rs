//! Outbound sync of applied updates.
//!
//! Phase two of every write: after the store has applied an update
//! locally, a [`SyncJob`] is queued here and a background worker persists
//! the sparse override and mirrors the payload to the external API. The
//! caller never waits on, or hears about, either outcome.
//!
//! Each job settles its pending patch in the [`ShelterStore`] once the
//! persist attempt is over, successful or not. Until then the store keeps
//! the local write overlaid on anything the remote store reports.

use crate::error::{BoardError, Result};
use crate::records::ShelterStore;
use crate::remote::{ApiMirror, OverrideStore};
use crate::types::{ShelterOverride, ShelterUpdatePayload};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// One applied update awaiting outbound sync.
#[derive(Clone, Debug)]
pub struct SyncJob {
    pub payload: ShelterUpdatePayload,
    /// Sparse patch to merge into the remote override entry.
    pub patch: ShelterOverride,
    /// Pending-patch sequence number assigned by the store.
    pub seq: u64,
}

enum Command {
    Sync(SyncJob),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    mirrored: AtomicU64,
    mirror_failures: AtomicU64,
    dropped: AtomicU64,
}

/// Outcome counts since the gateway started.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub persisted: u64,
    pub persist_failures: u64,
    pub mirrored: u64,
    pub mirror_failures: u64,
    /// Jobs refused because the queue was full or closed.
    pub dropped: u64,
}

/// Fire-and-forget writer to the override store and the API mirror.
pub struct SyncGateway {
    sender: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    store: Arc<ShelterStore>,
}

impl SyncGateway {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(
        store: Arc<ShelterStore>,
        overrides: Arc<dyn OverrideStore>,
        mirror: Option<Arc<dyn ApiMirror>>,
        queue_capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let worker = tokio::spawn(run(
            receiver,
            Arc::clone(&store),
            overrides,
            mirror,
            Arc::clone(&counters),
        ));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            counters,
            store,
        }
    }

    /// Queue a job without waiting. Returns false if it was dropped, in
    /// which case its pending patch is settled right away.
    pub fn enqueue(&self, job: SyncJob) -> bool {
        let shelter_id = job.payload.shelter_id.clone();
        let seq = job.seq;
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(Command::Sync(job)).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "gateway closed",
            }),
            None => Err("gateway closed"),
        };

        match sent {
            Ok(()) => true,
            Err(reason) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.store.settle(&shelter_id, seq);
                warn!(shelter_id = %shelter_id, reason, "dropping sync job");
                false
            }
        }
    }

    /// Wait until every job queued before this call has been processed.
    pub async fn flush(&self) -> Result<()> {
        let sender = self.sender.lock().clone().ok_or(BoardError::SyncClosed)?;
        let (done, wait) = oneshot::channel();
        sender
            .send(Command::Flush(done))
            .await
            .map_err(|_| BoardError::SyncClosed)?;
        wait.await.map_err(|_| BoardError::SyncClosed)
    }

    /// Stop accepting jobs, drain the queue and join the worker.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "sync worker terminated abnormally");
            }
        }
    }

    pub fn stats(&self) -> SyncStats {
        let c = &self.counters;
        SyncStats {
            persisted: c.persisted.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
            mirrored: c.mirrored.load(Ordering::Relaxed),
            mirror_failures: c.mirror_failures.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    mut receiver: mpsc::Receiver<Command>,
    store: Arc<ShelterStore>,
    overrides: Arc<dyn OverrideStore>,
    mirror: Option<Arc<dyn ApiMirror>>,
    counters: Arc<Counters>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Sync(job) => {
                process(job, &store, overrides.as_ref(), mirror.as_deref(), &counters).await
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("sync worker stopped");
}

async fn process(
    job: SyncJob,
    store: &ShelterStore,
    overrides: &dyn OverrideStore,
    mirror: Option<&dyn ApiMirror>,
    counters: &Counters,
) {
    let shelter_id = job.payload.shelter_id.as_str();

    match overrides.set(shelter_id, job.patch).await {
        Ok(()) => {
            counters.persisted.fetch_add(1, Ordering::Relaxed);
            debug!(shelter_id, resource = %job.payload.resource, "override persisted");
        }
        Err(e) => {
            counters.persist_failures.fetch_add(1, Ordering::Relaxed);
            error!(shelter_id, error = %e, "failed to persist override");
        }
    }
    store.settle(shelter_id, job.seq);

    if let Some(mirror) = mirror {
        match mirror.publish(&job.payload).await {
            Ok(()) => {
                counters.mirrored.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.mirror_failures.fetch_add(1, Ordering::Relaxed);
                error!(shelter_id, error = %e, "failed to mirror update");
            }
        }
    }
}
