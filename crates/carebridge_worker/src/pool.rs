//! The worker pool: claim loop, fairness, heartbeat, graceful drain.

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::front_queue::FrontQueue;
use crate::handler::{JobContext, JobHandler};
use carebridge_store::{Job, Store, SubmitOptions, WorkerRegistration};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A concurrency-bounded, multi-topic background job runner.
///
/// The pool claims jobs from the store's persisted backlog, one
/// atomic claim per job, and runs them through per-topic handlers.
/// Remaining capacity is divided fairly across topics so a saturated
/// topic cannot starve the others. Multiple pools (in one process or
/// many) may share a store; the claim at the storage layer is the
/// only coordination they need.
pub struct WorkerPool {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

struct Shared {
    store: Store,
    config: WorkerConfig,
    worker_id: Uuid,
    front: FrontQueue,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    running_total: AtomicUsize,
    running_by_topic: Mutex<HashMap<String, usize>>,
    started: AtomicBool,
    stopping: AtomicBool,
    /// Wakes the supervisor for a new claim pass.
    wake: tokio::sync::Notify,
    /// Wakes `stop` whenever an in-flight handler settles.
    drained: tokio::sync::Notify,
}

impl WorkerPool {
    /// Creates a pool over `store`. Call [`WorkerPool::start`] to
    /// begin claiming.
    pub fn new(store: Store, config: WorkerConfig) -> Self {
        let front = FrontQueue::new(config.front_queue_capacity);
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                worker_id: Uuid::new_v4(),
                front,
                handlers: RwLock::new(HashMap::new()),
                running_total: AtomicUsize::new(0),
                running_by_topic: Mutex::new(HashMap::new()),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                wake: tokio::sync::Notify::new(),
                drained: tokio::sync::Notify::new(),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Id under which this pool registers and claims.
    pub fn worker_id(&self) -> Uuid {
        self.shared.worker_id
    }

    /// Registers the handler for a topic, replacing any previous one.
    pub fn set_handler(&self, topic: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.shared.handlers.write().insert(topic.into(), handler);
        self.shared.wake.notify_one();
    }

    /// Submits a job to the persisted backlog and nudges the claim
    /// loop. Returns `None` when the submit coalesced into an
    /// existing queued job.
    pub fn submit(
        &self,
        topic: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Option<Uuid> {
        let id = self.shared.store.job_submit(topic, payload, options);
        self.shared.wake.notify_one();
        id
    }

    /// Submits a job and offers it to the front queue so it is
    /// claimed ahead of the next backlog scan. A full front queue
    /// degrades to a plain [`WorkerPool::submit`].
    pub fn submit_front(
        &self,
        topic: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Option<Uuid> {
        let id = self.shared.store.job_submit(topic, payload, options);
        if let Some(id) = id {
            if !self.shared.front.offer(id) {
                tracing::debug!(%id, topic, "front queue full, job waits for backlog scan");
            }
        }
        self.shared.wake.notify_one();
        id
    }

    /// Registers the worker and starts the heartbeat and claim loops.
    pub fn start(&self) -> WorkerResult<()> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }
        self.shared.stopping.store(false, Ordering::SeqCst);
        self.shared.store.worker_register(WorkerRegistration::new(
            self.shared.worker_id,
            self.shared.config.hostname.clone(),
            self.shared.config.version.clone(),
        ));
        tracing::info!(
            worker_id = %self.shared.worker_id,
            concurrency = self.shared.config.concurrency,
            "worker pool started"
        );
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(heartbeat_loop(Arc::clone(&self.shared))));
        tasks.push(tokio::spawn(supervise(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Stops claiming, waits for every in-flight handler to settle,
    /// clears handlers, and deregisters the worker. Running handlers
    /// are never cancelled.
    pub async fn stop(&self) {
        if !self.shared.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.wake.notify_waiters();

        loop {
            let settled = self.shared.drained.notified();
            if self.shared.running_total.load(Ordering::SeqCst) == 0 {
                break;
            }
            settled.await;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.shared.handlers.write().clear();
        self.shared.store.worker_deregister(self.shared.worker_id);
        tracing::info!(worker_id = %self.shared.worker_id, "worker pool stopped");
    }

    /// Claims and runs jobs for one topic until its backlog is empty
    /// and every handler this call dispatched has settled.
    ///
    /// Works with or without a started pool; the pool-wide
    /// concurrency bound still applies. Used by interactive triggers
    /// that need the topic drained before proceeding.
    pub async fn process_queue(&self, topic: &str) {
        loop {
            if self.shared.total_capacity() == 0 {
                let settled = self.shared.drained.notified();
                if self.shared.total_capacity() == 0 {
                    settled.await;
                }
                continue;
            }
            match self.shared.store.job_claim(topic, self.shared.worker_id) {
                Some(job) => dispatch(&self.shared, job),
                None => break,
            }
        }
        loop {
            let settled = self.shared.drained.notified();
            if self.shared.running_for(topic) == 0 {
                break;
            }
            settled.await;
        }
    }

    /// True between a successful `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Number of handler invocations currently in flight.
    pub fn running(&self) -> usize {
        self.shared.running_total.load(Ordering::SeqCst)
    }

    /// Spare concurrency right now.
    pub fn total_capacity(&self) -> usize {
        self.shared.total_capacity()
    }

    /// Fair share of the concurrency limit per registered topic.
    pub fn topic_capacity(&self) -> usize {
        self.shared.fair_share()
    }
}

impl Shared {
    fn total_capacity(&self) -> usize {
        self.config
            .concurrency
            .saturating_sub(self.running_total.load(Ordering::SeqCst))
    }

    fn fair_share(&self) -> usize {
        let topics = self.handlers.read().len().max(1);
        self.config.concurrency.div_ceil(topics)
    }

    fn running_for(&self, topic: &str) -> usize {
        self.running_by_topic
            .lock()
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    /// Concurrency this topic may use right now: its fair share while
    /// any other topic has pending backlog, the whole pool otherwise.
    fn topic_limit(&self, topic: &str) -> usize {
        let handlers = self.handlers.read();
        let others_waiting = handlers
            .keys()
            .any(|t| t != topic && self.store.job_backlog(t) > 0);
        drop(handlers);
        if others_waiting {
            self.fair_share()
        } else {
            self.config.concurrency
        }
    }

    fn topics(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}

async fn heartbeat_loop(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.heartbeat_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = shared.store.worker_heartbeat(shared.worker_id) {
            // logged only; the timer keeps ticking
            tracing::warn!(worker_id = %shared.worker_id, error = %err, "heartbeat failed");
        }
    }
}

async fn supervise(shared: Arc<Shared>) {
    loop {
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }
        scan_and_claim(&shared);
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(shared.config.poll_interval) => {
                for topic in shared.topics() {
                    let moved = shared.store.job_requeue_failed(&topic);
                    if moved > 0 {
                        tracing::debug!(%topic, moved, "requeued failed jobs");
                    }
                }
            }
        }
    }
}

/// One claim pass: drain the front queue first, then fill each
/// topic's fair share from the persisted backlog.
fn scan_and_claim(shared: &Arc<Shared>) {
    while shared.total_capacity() > 0 && !shared.stopping.load(Ordering::SeqCst) {
        let Some(id) = shared.front.take() else { break };
        let Some(peek) = shared.store.job_get(id) else {
            continue;
        };
        if !shared.handlers.read().contains_key(&peek.topic) {
            continue;
        }
        // the id may have been claimed by a competitor since it was offered
        if let Some(job) = shared.store.job_claim_by_id(id, shared.worker_id) {
            dispatch(shared, job);
        }
    }

    for topic in shared.topics() {
        loop {
            if shared.stopping.load(Ordering::SeqCst) || shared.total_capacity() == 0 {
                return;
            }
            if shared.running_for(&topic) >= shared.topic_limit(&topic) {
                break;
            }
            match shared.store.job_claim(&topic, shared.worker_id) {
                Some(job) => dispatch(shared, job),
                None => break,
            }
        }
    }
}

fn dispatch(shared: &Arc<Shared>, job: Job) {
    let handler = match shared.handlers.read().get(&job.topic) {
        Some(handler) => Arc::clone(handler),
        None => return,
    };
    shared.running_total.fetch_add(1, Ordering::SeqCst);
    *shared
        .running_by_topic
        .lock()
        .entry(job.topic.clone())
        .or_insert(0) += 1;

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let id = job.id;
        let topic = job.topic.clone();
        let ctx = JobContext {
            store: shared.store.clone(),
            worker_id: shared.worker_id,
        };

        // run in its own task so a panicking handler is contained
        let invocation = tokio::spawn(async move { handler.run(job, ctx).await });
        let result = match invocation.await {
            Ok(result) => result,
            Err(join) => Err(format!("handler panicked: {join}")),
        };

        let transition = match result {
            Ok(()) => {
                tracing::debug!(%id, %topic, "job done");
                shared.store.job_complete(id, shared.worker_id)
            }
            Err(message) => {
                tracing::warn!(%id, %topic, %message, "job failed");
                shared.store.job_fail(id, shared.worker_id, message)
            }
        };
        if let Err(err) = transition {
            tracing::error!(%id, error = %err, "job state transition rejected");
        }

        shared.running_total.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = shared.running_by_topic.lock().get_mut(&topic) {
            *count = count.saturating_sub(1);
        }
        shared.drained.notify_waiters();
        // self-sustaining: a finished slot immediately tries to claim
        shared.wake.notify_one();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fair_share_rounds_up() {
        let pool = WorkerPool::new(Store::new(), WorkerConfig::new().with_concurrency(4));
        assert_eq!(pool.topic_capacity(), 4); // no topics yet

        struct Noop;
        #[async_trait::async_trait]
        impl JobHandler for Noop {
            async fn run(&self, _job: Job, _ctx: JobContext) -> Result<(), String> {
                Ok(())
            }
        }
        pool.set_handler("a", Arc::new(Noop));
        pool.set_handler("b", Arc::new(Noop));
        pool.set_handler("c", Arc::new(Noop));
        assert_eq!(pool.topic_capacity(), 2); // ceil(4 / 3)
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let pool = WorkerPool::new(Store::new(), WorkerConfig::new());
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(WorkerError::AlreadyRunning)));
        pool.stop().await;
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let pool = WorkerPool::new(Store::new(), WorkerConfig::new());
        pool.stop().await;
        assert!(!pool.is_running());
    }
}
