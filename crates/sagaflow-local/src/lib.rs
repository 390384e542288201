//! # sagaflow-local
//!
//! In-process adapters for the sagaflow engine: an in-memory
//! [`InMemorySagaStore`], a [`RecordingEventBus`] test double and a
//! tokio-timer-backed [`LocalJobScheduler`]. Suitable for local
//! applications and testing; none of these survive a process restart, so
//! production deployments supply durable implementations of the same
//! ports.

pub mod event_bus;
pub mod job_scheduler;
pub mod saga_store;

pub use event_bus::RecordingEventBus;
pub use job_scheduler::LocalJobScheduler;
pub use saga_store::{InMemorySagaStore, InMemorySagaStoreError};
