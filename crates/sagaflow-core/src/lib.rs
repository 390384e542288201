//! # sagaflow-core
//!
//! Core saga (process manager) engine with zero infrastructure
//! dependencies: it correlates domain events to long-lived saga instances
//! through mutable association values, guarantees per-instance sequential
//! processing under concurrent dispatch, and schedules deadline events
//! for future delivery with a reliable success/failure callback protocol.
//!
//! ## Modules
//!
//! - [`association`]: [`AssociationValue`] and the bidirectional
//!   [`AssociationIndex`]
//! - [`saga`]: the [`Saga`] entity, its identity and lifecycle
//! - [`event`]: [`EventMessage`], the unit flowing through the engine
//! - [`handler`]: the [`SagaHandler`] invocation surface
//! - [`repository`]: [`SagaRepository`] — identity cache plus durable
//!   load/store through the backing-store port
//! - [`sequencer`]: [`DispatchSequencer`] — per-saga ordered, cross-saga
//!   parallel event dispatch
//! - [`deadline`]: [`DeadlineScheduler`] and the three-phase
//!   [`DeadlineDelivery`] firing routine
//! - [`port`]: traits for the external collaborators (backing store,
//!   event bus, durable job scheduler, trigger callback)

pub mod association;
pub mod deadline;
pub mod event;
pub mod handler;
pub mod port;
pub mod repository;
pub mod saga;
pub mod sequencer;

pub use association::{AssociationIndex, AssociationIndexError, AssociationValue};
pub use deadline::{
    DeadlineDelivery, DeadlineError, DeadlineScheduler, DeliveryError, JobStatus, ScheduleToken,
    ScheduledJob,
};
pub use event::EventMessage;
pub use handler::{HandlerError, SagaDirective, SagaHandler};
pub use port::{
    EventBus, EventBusError, JobRunner, JobScheduler, JobSchedulerError, NoOpTriggerCallback,
    SagaStore, TriggerCallback,
};
pub use repository::{RepositoryError, SagaEntry, SagaHandle, SagaRepository};
pub use saga::{Saga, SagaId, SagaLifecycle, SagaType};
pub use sequencer::{
    DispatchError, DispatchSequencer, SagaCreationPolicy, SequencerConfig, SequencerMetrics,
    SequencerMetricsSnapshot,
};
