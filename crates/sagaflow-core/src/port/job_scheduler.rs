//! # JobScheduler Port
//!
//! The external durable scheduler that holds deadline jobs until their
//! fire time. Implementations must persist pending jobs across process
//! restarts and invoke the registered [`JobRunner`] at fire time, once
//! per attempt; retry policy after a failed delivery is the scheduler's
//! own concern. The core never assumes in-memory job state survives a
//! crash.

use crate::deadline::{DeliveryError, ScheduleToken, ScheduledJob};
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Errors from scheduler operations, generic over the adapter's error.
#[derive(Debug, Error)]
pub enum JobSchedulerError<E> {
    #[error("job submission failed: {0:?}")]
    Submit(E),

    #[error("job cancellation failed: {0:?}")]
    Cancel(E),
}

/// The firing routine the scheduler invokes when a job's time arrives.
///
/// The engine registers one runner with the scheduler at wiring time;
/// [`crate::deadline::DeadlineDelivery`] is the engine's implementation.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Deliver a fired job. An `Err` is the re-signal that lets the
    /// scheduler apply its own retry policy.
    async fn run(&self, job: ScheduledJob) -> Result<(), DeliveryError>;
}

/// Trait for durable deadline-job scheduling.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// The error type for this implementation.
    type Error: Debug + Send + Sync + 'static;

    /// Register a job for future firing. Returns immediately.
    async fn submit(&self, job: ScheduledJob) -> Result<(), JobSchedulerError<Self::Error>>;

    /// Best-effort removal of a pending job before it fires.
    ///
    /// Returns `true` if the job was still pending and is now cancelled.
    /// A job that has already begun firing is not taken back; `false` is
    /// returned and the in-flight delivery runs to completion.
    async fn cancel(&self, token: &ScheduleToken) -> Result<bool, JobSchedulerError<Self::Error>>;
}
