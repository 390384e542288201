//! # Dispatch Sequencer
//!
//! Routes incoming events to the sagas selected by their declared
//! association values and guarantees that events destined for the same
//! saga are applied one at a time, in publication order, while unrelated
//! sagas proceed in parallel.
//!
//! The sequencer runs a fixed set of lanes. [`DispatchSequencer::publish`]
//! assigns each event a publication sequence number and broadcasts it to
//! every lane; each lane consumes its stream strictly in that order. A
//! saga is owned by exactly one lane (by hash of its identifier), and a
//! lane resolves, handles and commits its owned sagas serially — so a
//! lane's own resolution always observes its own prior commits, which is
//! what keeps association rewriting race-free.

use crate::association::AssociationValue;
use crate::event::EventMessage;
use crate::handler::{apply_directives, SagaHandler};
use crate::port::saga_store::SagaStore;
use crate::repository::{SagaHandle, SagaRepository};
use crate::saga::{SagaId, SagaType};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Whether dispatching an event may create a new saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaCreationPolicy {
    /// Only existing sagas handle the event.
    None,
    /// Create a new saga when no existing saga matches the event's
    /// association values.
    IfNoneFound,
    /// Always create a new saga, in addition to any existing matches.
    Always,
}

/// Sequencer configuration.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Number of dispatch lanes (cross-saga parallelism).
    pub lanes: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self { lanes: 4 }
    }
}

impl SequencerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = lanes.max(1);
        self
    }
}

/// Errors from event publication into the sequencer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sequencer has been shut down")]
    ShutDown,
}

/// Dispatch counters. Snapshot with [`SequencerMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct SequencerMetrics {
    events_published: AtomicU64,
    events_handled: AtomicU64,
    sagas_created: AtomicU64,
    handler_failures: AtomicU64,
    commit_failures: AtomicU64,
}

/// Point-in-time view of [`SequencerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerMetricsSnapshot {
    pub events_published: u64,
    pub events_handled: u64,
    pub sagas_created: u64,
    pub handler_failures: u64,
    pub commit_failures: u64,
}

impl SequencerMetrics {
    pub fn snapshot(&self) -> SequencerMetricsSnapshot {
        SequencerMetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_handled: self.events_handled.load(Ordering::Relaxed),
            sagas_created: self.sagas_created.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }
}

/// One-shot vote over whether any lane owns a saga matching an event.
///
/// Used for [`SagaCreationPolicy::IfNoneFound`]: every lane casts exactly
/// one vote per event, and the lane owning the pre-allocated identifier
/// awaits all votes before deciding to create. Each lane votes about its
/// own sagas at its own position in the event stream, so votes are exact.
#[derive(Debug)]
struct CreationVote {
    pending: AtomicUsize,
    matched: AtomicBool,
    notify: Notify,
}

impl CreationVote {
    fn new(lanes: usize) -> Self {
        Self {
            pending: AtomicUsize::new(lanes),
            matched: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn cast(&self, matched: bool) {
        if matched {
            self.matched.store(true, Ordering::Release);
        }
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Wait until every lane voted; returns whether any lane matched.
    async fn outcome(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::Acquire) == 0 {
                return self.matched.load(Ordering::Acquire);
            }
            notified.await;
        }
    }
}

/// Tracker for enqueued-but-unfinished lane work, for [`DispatchSequencer::drain`].
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    notify: Notify,
}

impl InFlight {
    fn add(&self, n: u64) {
        self.count.fetch_add(n, Ordering::AcqRel);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// One published event as seen by the lanes.
#[derive(Debug)]
struct DispatchJob {
    seq: u64,
    saga_type: SagaType,
    event: EventMessage,
    values: Vec<AssociationValue>,
    policy: SagaCreationPolicy,
    /// Identifier a created saga will get; decides the creating lane.
    creation_id: SagaId,
    vote: Option<CreationVote>,
}

/// The dispatch sequencer. See the module docs for the lane model.
pub struct DispatchSequencer<S, H>
where
    S: SagaStore + 'static,
    H: SagaHandler + 'static,
{
    repository: Arc<SagaRepository<S>>,
    lanes: Vec<mpsc::UnboundedSender<Arc<DispatchJob>>>,
    tasks: Vec<JoinHandle<()>>,
    seq: AtomicU64,
    /// Serializes sequence assignment with the lane broadcast, so every
    /// lane receives jobs in the same order. Without it, two concurrent
    /// publishers can enqueue on different lanes in opposite orders and
    /// the creation votes wait on each other forever.
    publish_gate: parking_lot::Mutex<()>,
    in_flight: Arc<InFlight>,
    metrics: Arc<SequencerMetrics>,
    _handler: std::marker::PhantomData<H>,
}

fn lane_of(saga_id: &SagaId, lane_count: usize) -> usize {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    saga_id.hash(&mut hasher);
    (hasher.finish() as usize) % lane_count
}

impl<S, H> DispatchSequencer<S, H>
where
    S: SagaStore + 'static,
    H: SagaHandler + 'static,
{
    /// Start the sequencer's lanes over the given repository and handler.
    pub fn new(
        config: SequencerConfig,
        repository: Arc<SagaRepository<S>>,
        handler: Arc<H>,
    ) -> Self {
        let lane_count = config.lanes.max(1);
        let metrics = Arc::new(SequencerMetrics::default());
        let in_flight = Arc::new(InFlight::default());

        let mut lanes = Vec::with_capacity(lane_count);
        let mut tasks = Vec::with_capacity(lane_count);
        for lane in 0..lane_count {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.push(tx);
            tasks.push(tokio::spawn(Self::run_lane(
                lane,
                lane_count,
                rx,
                Arc::clone(&repository),
                Arc::clone(&handler),
                Arc::clone(&metrics),
                Arc::clone(&in_flight),
            )));
        }

        Self {
            repository,
            lanes,
            tasks,
            seq: AtomicU64::new(0),
            publish_gate: parking_lot::Mutex::new(()),
            in_flight,
            metrics,
            _handler: std::marker::PhantomData,
        }
    }

    /// The repository this sequencer dispatches through.
    pub fn repository(&self) -> &Arc<SagaRepository<S>> {
        &self.repository
    }

    /// Dispatch counters.
    pub fn metrics(&self) -> &SequencerMetrics {
        &self.metrics
    }

    /// Publish an event into the sequencer.
    ///
    /// The call assigns the event its place in publication order and
    /// returns once the event is enqueued on every lane; handling is
    /// asynchronous. Sequence assignment and the lane broadcast happen
    /// under one gate, so concurrent publishers are serialized and every
    /// lane observes the same order. Events published by one caller in
    /// sequence are applied to any given saga in that sequence.
    pub fn publish(
        &self,
        saga_type: SagaType,
        event: EventMessage,
        values: Vec<AssociationValue>,
        policy: SagaCreationPolicy,
    ) -> Result<u64, DispatchError> {
        let vote = match policy {
            SagaCreationPolicy::IfNoneFound => Some(CreationVote::new(self.lanes.len())),
            _ => None,
        };

        let _gate = self.publish_gate.lock();
        let seq = self.seq.fetch_add(1, Ordering::AcqRel);
        let job = Arc::new(DispatchJob {
            seq,
            saga_type,
            event,
            values,
            policy,
            creation_id: SagaId::new(),
            vote,
        });

        self.in_flight.add(self.lanes.len() as u64);
        for tx in &self.lanes {
            if tx.send(Arc::clone(&job)).is_err() {
                return Err(DispatchError::ShutDown);
            }
        }
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(seq)
    }

    /// Wait until every published event has been fully processed.
    pub async fn drain(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Stop accepting events, process what is enqueued, and join the
    /// lanes.
    pub async fn shutdown(mut self) {
        self.lanes.clear();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "dispatch lane panicked");
            }
        }
    }

    async fn run_lane(
        lane: usize,
        lane_count: usize,
        mut rx: mpsc::UnboundedReceiver<Arc<DispatchJob>>,
        repository: Arc<SagaRepository<S>>,
        handler: Arc<H>,
        metrics: Arc<SequencerMetrics>,
        in_flight: Arc<InFlight>,
    ) {
        while let Some(job) = rx.recv().await {
            Self::process(lane, lane_count, &job, &repository, &handler, &metrics).await;
            in_flight.done();
        }
        debug!(lane, "dispatch lane stopped");
    }

    async fn process(
        lane: usize,
        lane_count: usize,
        job: &DispatchJob,
        repository: &SagaRepository<S>,
        handler: &H,
        metrics: &SequencerMetrics,
    ) {
        let owned: Vec<SagaId> = repository
            .matching_ids(&job.values)
            .into_iter()
            .filter(|id| lane_of(id, lane_count) == lane)
            .collect();

        if let Some(vote) = &job.vote {
            vote.cast(!owned.is_empty());
        }

        for id in owned {
            match repository.acquire(&job.saga_type, &id).await {
                Ok(Some(handle)) => {
                    Self::invoke(&handle, job, repository, handler, metrics).await;
                }
                Ok(None) => {}
                Err(e) => {
                    // Aborts this event for this saga only.
                    warn!(seq = job.seq, saga_id = %id, error = %e, "saga resolution failed");
                }
            }
        }

        if job.policy != SagaCreationPolicy::None
            && lane_of(&job.creation_id, lane_count) == lane
        {
            let create = match (&job.policy, &job.vote) {
                (SagaCreationPolicy::Always, _) => true,
                (SagaCreationPolicy::IfNoneFound, Some(vote)) => !vote.outcome().await,
                _ => false,
            };
            if create {
                let handle = repository
                    .create_instance_with_id(job.saga_type.clone(), job.creation_id.clone());
                {
                    let mut saga = handle.lock().await;
                    for value in &job.values {
                        saga.associate(value.clone());
                    }
                }
                metrics.sagas_created.fetch_add(1, Ordering::Relaxed);
                debug!(seq = job.seq, saga_id = %job.creation_id, "saga created");
                Self::invoke(&handle, job, repository, handler, metrics).await;
            }
        }
    }

    /// Exclusive handler invocation plus commit; the per-saga lock is
    /// held until the commit is visible. An aborted event leaves the
    /// cached saga exactly as it found it.
    async fn invoke(
        handle: &SagaHandle,
        job: &DispatchJob,
        repository: &SagaRepository<S>,
        handler: &H,
        metrics: &SequencerMetrics,
    ) {
        let mut saga = handle.lock().await;
        if saga.is_ended() {
            return;
        }
        let snapshot = saga.clone();
        match handler.on_event(&mut saga, &job.event).await {
            Ok(directives) => {
                apply_directives(&mut saga, directives);
                match repository.commit(&mut saga).await {
                    Ok(()) => {
                        metrics.events_handled.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        *saga = snapshot;
                        metrics.commit_failures.fetch_add(1, Ordering::Relaxed);
                        error!(seq = job.seq, saga_id = %saga.id(), error = %e, "saga commit failed");
                    }
                }
            }
            Err(e) => {
                *saga = snapshot;
                metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(seq = job.seq, saga_id = %saga.id(), error = %e, "saga handler failed");
            }
        }
    }
}
