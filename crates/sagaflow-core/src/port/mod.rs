//! Ports for the engine's external collaborators.
//!
//! This module defines the trait abstractions the engine uses to reach
//! infrastructure: durable saga storage, the event bus, the durable job
//! scheduler and the optional trigger callback. Each port can have
//! multiple implementations (in-memory, database-backed, mock).

pub mod event_bus;
pub mod job_scheduler;
pub mod saga_store;
pub mod trigger_callback;

pub use event_bus::{EventBus, EventBusError};
pub use job_scheduler::{JobRunner, JobScheduler, JobSchedulerError};
pub use saga_store::SagaStore;
pub use trigger_callback::{NoOpTriggerCallback, TriggerCallback};
