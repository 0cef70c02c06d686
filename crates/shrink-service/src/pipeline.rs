use shrink_core::{ShortId, UrlStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::error;

/// A user's request to delete some of their mappings.
///
/// Ephemeral: lives only inside the pipeline's queue and batch buffers,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub owner_id: String,
    pub short_ids: Vec<ShortId>,
}

/// Tuning knobs for the deletion pipeline. The defaults are the
/// production values; tests shrink them to force specific timings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Bounded queue capacity shared by all workers.
    pub queue_capacity: usize,
    /// Number of concurrent worker pipelines.
    pub workers: usize,
    /// A batch flushes as soon as it holds this many requests.
    pub max_batch_size: usize,
    /// A batch flushes this long after its first request arrived, even
    /// if it never fills up.
    pub max_batch_wait: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            workers: 3,
            max_batch_size: 10,
            max_batch_wait: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    /// Back-pressure signal: the bounded queue is full. Callers must not
    /// retry internally; the signal is surfaced to the end client.
    #[error("deletion queue is full, try again later")]
    QueueFull,
    #[error("deletion pipeline is closed")]
    Closed,
}

/// Asynchronous batched deletion pipeline.
///
/// Producers enqueue [`DeleteRequest`]s without blocking; a fixed pool of
/// workers pulls from one shared bounded queue, groups consecutive
/// requests into batches bounded by size and wait time, merges each batch
/// by owner and issues one bulk soft-delete per owner.
///
/// No ordering is guaranteed across owners, nor across batches for the
/// same owner when they land on different workers; within one batch an
/// owner's requests are merged and applied together. Failures inside the
/// applier are logged and dropped, never retried and never observable by
/// the caller that enqueued the request.
#[derive(Debug)]
pub struct DeletePipeline {
    tx: Option<mpsc::Sender<DeleteRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl DeletePipeline {
    /// Starts the pipeline with default settings. Must be called from
    /// within a tokio runtime.
    pub fn start<S: UrlStore>(store: Arc<S>) -> Self {
        Self::with_settings(store, PipelineSettings::default())
    }

    /// Starts the pipeline with custom settings.
    pub fn with_settings<S: UrlStore>(store: Arc<S>, settings: PipelineSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..settings.workers)
            .map(|_| {
                let store = Arc::clone(&store);
                let rx = Arc::clone(&rx);
                let settings = settings.clone();
                tokio::spawn(worker_loop(store, rx, settings))
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Submits a deletion request. Never blocks: a full queue is reported
    /// as [`EnqueueError::QueueFull`] immediately.
    pub fn enqueue(&self, request: DeleteRequest) -> Result<(), EnqueueError> {
        let Some(tx) = &self.tx else {
            return Err(EnqueueError::Closed);
        };

        match tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    /// Closes the queue and waits for every worker to drain and exit.
    ///
    /// Each worker flushes the partial batch it is holding before
    /// terminating, so all accepted requests are applied. There is no
    /// internal timeout; impose one externally if the shutdown window is
    /// bounded.
    pub async fn close(&mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                error!(?err, "deletion worker terminated abnormally");
            }
        }
    }
}

/// Receives the next request from the shared queue.
///
/// The receiver lock is held only for the duration of one `recv`; it is
/// released when this future completes or is cancelled by the batch
/// timer, so a worker waiting out its batch window never starves the
/// others while it is applying a batch.
async fn recv(rx: &Mutex<mpsc::Receiver<DeleteRequest>>) -> Option<DeleteRequest> {
    rx.lock().await.recv().await
}

/// One worker: batch collector plus batch applier.
async fn worker_loop<S: UrlStore>(
    store: Arc<S>,
    rx: Arc<Mutex<mpsc::Receiver<DeleteRequest>>>,
    settings: PipelineSettings,
) {
    let mut batch: Vec<DeleteRequest> = Vec::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let next = match deadline {
            Some(at) => match timeout_at(at, recv(&rx)).await {
                Ok(next) => next,
                Err(_) => {
                    // Wait window elapsed before the batch filled up.
                    apply_batch(store.as_ref(), std::mem::take(&mut batch)).await;
                    deadline = None;
                    continue;
                }
            },
            None => recv(&rx).await,
        };

        match next {
            Some(request) => {
                if batch.is_empty() {
                    deadline = Some(Instant::now() + settings.max_batch_wait);
                }
                batch.push(request);

                if batch.len() >= settings.max_batch_size {
                    apply_batch(store.as_ref(), std::mem::take(&mut batch)).await;
                    deadline = None;
                }
            }
            None => {
                // Queue closed: flush whatever is left and exit.
                apply_batch(store.as_ref(), std::mem::take(&mut batch)).await;
                return;
            }
        }
    }
}

/// Merges a batch by owner and issues one bulk delete per owner.
///
/// A failure on one owner's call does not affect the other owners in the
/// batch, and the batch is never retried.
async fn apply_batch<S: UrlStore>(store: &S, batch: Vec<DeleteRequest>) {
    if batch.is_empty() {
        return;
    }

    let mut merged: HashMap<String, Vec<ShortId>> = HashMap::new();
    for request in batch {
        merged
            .entry(request.owner_id)
            .or_default()
            .extend(request.short_ids);
    }

    for (owner_id, short_ids) in merged {
        if let Err(err) = store.batch_delete_user_urls(&owner_id, &short_ids).await {
            error!(%owner_id, %err, "failed to apply deletion batch");
        }
    }
}
