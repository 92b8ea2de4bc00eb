//! Request-batching inference scheduler
//!
//! Coalesces independently-arriving prediction requests into batches
//! before dispatching them to the classifier, amortizing the engine's
//! fixed per-call overhead while keeping per-request latency bounded.
//!
//! A single coordinator task owns the forming batch: requests are admitted
//! over an mpsc channel (FIFO), and the batch closes when it reaches
//! `max_batch_size` or when `max_wait` has elapsed since its first member
//! arrived, whichever comes first. Closed batches run on a bounded worker
//! pool; results are fanned back to callers positionally through one-shot
//! slots. A worker error resolves every slot of its batch with that same
//! error, since a matrix-level failure cannot be attributed to one row.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::features::ConnectionRecord;
use crate::model::{Classifier, Prediction};
use crate::PredictError;

/// Batching parameters, fixed at spawn time.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum requests coalesced into one dispatch.
    pub max_batch_size: usize,
    /// Maximum time a forming batch waits after its first member arrives.
    pub max_wait: Duration,
    /// Maximum batches in flight against the engine concurrently.
    pub worker_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 64,
            max_wait: Duration::from_millis(5),
            worker_concurrency: 8,
        }
    }
}

/// One admitted request: the record plus its single-assignment result slot.
///
/// Sending on the slot consumes it; a dropped receiver (abandoned caller)
/// turns resolution into a no-op.
struct PendingRequest {
    record: ConnectionRecord,
    slot: oneshot::Sender<Result<Prediction, PredictError>>,
}

/// Cloneable handle for submitting requests to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<PendingRequest>,
    shutdown: Arc<watch::Sender<bool>>,
    coordinator: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SchedulerHandle {
    /// Submit one record and await its prediction.
    ///
    /// Resolves once the batch containing this record has been classified,
    /// never later than `max_wait` plus engine time after admission. Fails
    /// immediately with [`PredictError::Unavailable`] once shutdown has
    /// begun.
    pub async fn submit(&self, record: ConnectionRecord) -> Result<Prediction, PredictError> {
        if *self.shutdown.borrow() {
            return Err(PredictError::Unavailable);
        }
        let (slot, result) = oneshot::channel();
        self.tx
            .send(PendingRequest { record, slot })
            .await
            .map_err(|_| PredictError::Unavailable)?;
        // A slot dropped unresolved means the scheduler tore down first.
        result.await.map_err(|_| PredictError::Unavailable)?
    }

    /// Begin graceful shutdown and wait for in-flight batches to finish.
    ///
    /// Subsequent submits fail fast; the batch forming at the moment of
    /// shutdown is still dispatched and its callers still get results.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.coordinator.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// The batching scheduler. Construct with [`Scheduler::spawn`].
pub struct Scheduler;

impl Scheduler {
    /// Start the coordinator task and return a handle for submissions.
    pub fn spawn<C>(config: SchedulerConfig, engine: Arc<C>) -> SchedulerHandle
    where
        C: Classifier + ?Sized + 'static,
    {
        let max_batch_size = config.max_batch_size.max(1);
        let worker_concurrency = config.worker_concurrency.max(1);
        let (tx, rx) = mpsc::channel(max_batch_size * worker_concurrency);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            max_batch_size,
            max_wait_ms = config.max_wait.as_millis() as u64,
            worker_concurrency,
            "batching scheduler started"
        );

        let coordinator = Coordinator {
            max_batch_size,
            max_wait: config.max_wait,
            worker_concurrency,
            engine,
            rx,
            shutdown: shutdown_rx,
            workers: Arc::new(Semaphore::new(worker_concurrency)),
        };
        let task = tokio::spawn(coordinator.run());

        SchedulerHandle {
            tx,
            shutdown: Arc::new(shutdown_tx),
            coordinator: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Single point of admission: the only task that mutates a forming batch.
struct Coordinator<C: Classifier + ?Sized> {
    max_batch_size: usize,
    max_wait: Duration,
    worker_concurrency: usize,
    engine: Arc<C>,
    rx: mpsc::Receiver<PendingRequest>,
    shutdown: watch::Receiver<bool>,
    workers: Arc<Semaphore>,
}

impl<C: Classifier + ?Sized + 'static> Coordinator<C> {
    async fn run(mut self) {
        let mut open = true;
        while open {
            // Idle: suspend until the first member of the next batch
            // arrives or shutdown begins. No timer runs while empty.
            let first = tokio::select! {
                maybe = self.rx.recv() => maybe,
                _ = self.shutdown.changed() => None,
            };
            let Some(first) = first else { break };

            let mut batch = vec![first];
            let deadline = Instant::now() + self.max_wait;
            while batch.len() < self.max_batch_size {
                tokio::select! {
                    maybe = self.rx.recv() => match maybe {
                        Some(request) => batch.push(request),
                        None => {
                            open = false;
                            break;
                        }
                    },
                    _ = sleep_until(deadline) => break,
                    _ = self.shutdown.changed() => {
                        // Flush what was admitted before shutdown; no new
                        // batch forms after this one.
                        open = false;
                        break;
                    }
                }
            }
            self.dispatch(batch).await;
        }

        // Graceful drain: wait until every in-flight batch has released
        // its worker before tearing down.
        let _ = self.workers.acquire_many(self.worker_concurrency as u32).await;
        info!("batching scheduler stopped");
    }

    /// Hand a closed batch to a worker. Blocks admission only when all
    /// workers are busy.
    async fn dispatch(&self, batch: Vec<PendingRequest>) {
        let permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore is never closed while the coordinator lives.
            Err(_) => return,
        };

        let batch_id = Uuid::new_v4();
        debug!(%batch_id, size = batch.len(), "dispatching batch");

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let _permit = permit;
            let (records, slots): (Vec<_>, Vec<_>) = batch
                .into_iter()
                .map(|request| (request.record, request.slot))
                .unzip();

            let outcome = tokio::task::spawn_blocking(move || engine.classify(&records))
                .await
                .unwrap_or_else(|e| {
                    Err(PredictError::Inference(format!("inference task failed: {e}")))
                });

            match outcome {
                Ok(results) if results.len() == slots.len() => {
                    // Positional correspondence is the only identity
                    // mechanism between request and result.
                    for (slot, result) in slots.into_iter().zip(results) {
                        let _ = slot.send(Ok(result));
                    }
                }
                Ok(results) => {
                    warn!(
                        %batch_id,
                        expected = slots.len(),
                        got = results.len(),
                        "engine returned a mismatched result count"
                    );
                    let error = PredictError::Inference(
                        "engine returned a mismatched result count".into(),
                    );
                    for slot in slots {
                        let _ = slot.send(Err(error.clone()));
                    }
                }
                Err(error) => {
                    debug!(%batch_id, %error, "batch failed, fanning error to all members");
                    for slot in slots {
                        let _ = slot.send(Err(error.clone()));
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Engine stub that records every batch it sees, keyed by the
    /// `duration` field used as a per-request marker.
    struct MockEngine {
        batches: Mutex<Vec<Vec<u64>>>,
        fail: bool,
        delay: Duration,
    }

    impl MockEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail: false,
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail: true,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                fail: false,
                delay,
            })
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(Vec::len).collect()
        }
    }

    impl Classifier for MockEngine {
        fn classify(&self, records: &[ConnectionRecord]) -> Result<Vec<Prediction>, PredictError> {
            let markers: Vec<u64> = records.iter().map(|r| r.duration).collect();
            self.batches.lock().push(markers.clone());
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail {
                return Err(PredictError::Inference("engine exploded".into()));
            }
            Ok(markers
                .into_iter()
                .map(|marker| Prediction {
                    label: format!("m{marker}"),
                    probabilities: BTreeMap::from([(format!("m{marker}"), 1.0)]),
                })
                .collect())
        }
    }

    fn record(marker: u64) -> ConnectionRecord {
        ConnectionRecord {
            duration: marker,
            ..Default::default()
        }
    }

    fn config(max_batch_size: usize, wait_ms: u64, workers: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_batch_size,
            max_wait: Duration::from_millis(wait_ms),
            worker_concurrency: workers,
        }
    }

    #[tokio::test]
    async fn coalesces_concurrent_requests_into_one_fifo_batch() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(8, 50, 2), engine.clone());

        let (a, b, c, d, e) = tokio::join!(
            handle.submit(record(0)),
            handle.submit(record(1)),
            handle.submit(record(2)),
            handle.submit(record(3)),
            handle.submit(record(4)),
        );
        for (i, result) in [a, b, c, d, e].into_iter().enumerate() {
            assert_eq!(result.unwrap().label, format!("m{i}"));
        }

        let batches = engine.batches.lock().clone();
        assert_eq!(batches, vec![vec![0, 1, 2, 3, 4]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn splits_simultaneous_load_at_max_batch_size() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(64, 200, 8), engine.clone());

        let mut tasks = Vec::new();
        for marker in 0..200u64 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(
                async move { handle.submit(record(marker)).await },
            ));
        }

        let mut seen = Vec::new();
        for (marker, task) in tasks.into_iter().enumerate() {
            let prediction = task.await.unwrap().unwrap();
            assert_eq!(prediction.label, format!("m{marker}"));
            seen.push(marker as u64);
        }
        assert_eq!(seen.len(), 200);

        let sizes = engine.batch_sizes();
        assert_eq!(sizes, vec![64, 64, 64, 8]);

        let mut all: Vec<u64> = engine.batches.lock().iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dispatches_partial_batch_at_deadline() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(64, 10, 2), engine.clone());

        let started = std::time::Instant::now();
        let prediction = handle.submit(record(7)).await.unwrap();
        assert_eq!(prediction.label, "m7");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(engine.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn engine_error_fans_out_to_every_member() {
        let engine = MockEngine::failing();
        let handle = Scheduler::spawn(config(8, 20, 2), engine.clone());

        let (a, b, c) = tokio::join!(
            handle.submit(record(0)),
            handle.submit(record(1)),
            handle.submit(record(2)),
        );
        let expected = PredictError::Inference("engine exploded".into());
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
        assert_eq!(c.unwrap_err(), expected);
        assert_eq!(engine.batch_sizes(), vec![3]);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_fast() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(8, 10, 2), engine.clone());

        handle.shutdown().await;
        let err = handle.submit(record(0)).await.unwrap_err();
        assert_eq!(err, PredictError::Unavailable);
        assert!(engine.batch_sizes().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn inflight_batch_completes_during_shutdown() {
        let engine = MockEngine::slow(Duration::from_millis(50));
        let handle = Scheduler::spawn(config(4, 5, 1), engine.clone());

        let submitter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit(record(9)).await })
        };
        // Let the batch close and reach the worker before shutting down.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown().await;

        let prediction = submitter.await.unwrap().unwrap();
        assert_eq!(prediction.label, "m9");
        assert_eq!(
            handle.submit(record(1)).await.unwrap_err(),
            PredictError::Unavailable
        );
    }

    #[tokio::test]
    async fn abandoned_caller_does_not_disturb_the_batch() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(4, 30, 1), engine.clone());

        let abandoned = tokio::time::timeout(Duration::from_millis(5), handle.submit(record(1)));
        let kept = handle.submit(record(2));
        let (abandoned, kept) = tokio::join!(abandoned, kept);

        assert!(abandoned.is_err()); // timed out, slot receiver dropped
        assert_eq!(kept.unwrap().label, "m2");
        assert_eq!(engine.batches.lock().clone(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn identical_records_yield_identical_results() {
        let engine = MockEngine::new();
        let handle = Scheduler::spawn(config(4, 5, 2), engine.clone());

        let first = handle.submit(record(5)).await.unwrap();
        let second = handle.submit(record(5)).await.unwrap();
        assert_eq!(first, second);
    }
}
