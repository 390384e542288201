//! # Deadline Scheduling
//!
//! A deadline is an event scheduled for future delivery back into the
//! event stream. [`DeadlineScheduler`] registers jobs with the external
//! durable [`crate::port::JobScheduler`]; [`DeadlineDelivery`] is the
//! firing routine the scheduler invokes at fire time, executing the
//! three-phase protocol (before-publish, publish, after-success /
//! after-failure) against the event bus and the optional trigger
//! callback.

use crate::event::EventMessage;
use crate::port::event_bus::{EventBus, EventBusError};
use crate::port::job_scheduler::{JobRunner, JobScheduler, JobSchedulerError};
use crate::port::trigger_callback::{NoOpTriggerCallback, TriggerCallback};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Opaque handle to a scheduled job, used for cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleToken(pub Uuid);

impl ScheduleToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScheduleToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a scheduled job.
///
/// `Scheduled -> Firing -> {Delivered, Failed}`; `Scheduled -> Cancelled`
/// is reachable only before firing begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Firing,
    Delivered,
    Failed,
    Cancelled,
}

/// A deadline job held durably by the scheduler collaborator until its
/// fire time.
///
/// The event travels encoded, since jobs cross the scheduler's
/// durability boundary; the firing routine decodes it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Handle for cancellation.
    pub token: ScheduleToken,
    /// Encoded [`EventMessage`] to deliver.
    pub payload: serde_json::Value,
    /// When the job should fire.
    pub fire_at: chrono::DateTime<chrono::Utc>,
    /// When the job was scheduled.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Current job status.
    pub status: JobStatus,
}

impl ScheduledJob {
    /// Build a job carrying the given event.
    pub fn new(
        event: &EventMessage,
        fire_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            token: ScheduleToken::new(),
            payload: serde_json::to_value(event)?,
            fire_at,
            created_at: chrono::Utc::now(),
            status: JobStatus::Scheduled,
        })
    }

    /// Enter the firing phase. Only a `Scheduled` job can begin firing;
    /// returns whether the transition happened.
    pub fn mark_firing(&mut self) -> bool {
        if self.status != JobStatus::Scheduled {
            return false;
        }
        self.status = JobStatus::Firing;
        true
    }

    pub fn mark_delivered(&mut self) {
        self.status = JobStatus::Delivered;
    }

    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
    }

    /// Cancel the job. Has no effect once firing has begun; returns
    /// whether the job is now cancelled.
    pub fn mark_cancelled(&mut self) -> bool {
        if self.status != JobStatus::Scheduled {
            return false;
        }
        self.status = JobStatus::Cancelled;
        true
    }
}

/// Errors from the firing routine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The bus did not accept the event. Re-signaled to the scheduler
    /// collaborator so it can apply its retry policy.
    #[error("deadline publication failed: {0}")]
    Publish(#[from] EventBusError),

    /// The job cannot be delivered at all (undecodable payload). Fatal
    /// for that job; not worth retrying.
    #[error("deadline job misconfigured: {0}")]
    Configuration(String),
}

/// Errors from scheduling or cancelling a deadline.
#[derive(Debug, Error)]
pub enum DeadlineError<E> {
    #[error("deadline payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Scheduler(JobSchedulerError<E>),
}

/// Front door for deadline scheduling: builds jobs and hands them to the
/// durable scheduler collaborator.
#[derive(Debug)]
pub struct DeadlineScheduler<J: JobScheduler> {
    scheduler: Arc<J>,
}

impl<J: JobScheduler> DeadlineScheduler<J> {
    pub fn new(scheduler: Arc<J>) -> Self {
        Self { scheduler }
    }

    /// Schedule `event` for delivery at `fire_at`. Returns immediately
    /// with the job's cancellation token.
    pub async fn schedule(
        &self,
        event: &EventMessage,
        fire_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<ScheduleToken, DeadlineError<J::Error>> {
        let job = ScheduledJob::new(event, fire_at)?;
        let token = job.token.clone();
        debug!(token = %token, fire_at = %fire_at, "deadline scheduled");
        self.scheduler
            .submit(job)
            .await
            .map_err(DeadlineError::Scheduler)?;
        Ok(token)
    }

    /// Schedule `event` for delivery after `delay` from now.
    pub async fn schedule_after(
        &self,
        event: &EventMessage,
        delay: std::time::Duration,
    ) -> Result<ScheduleToken, DeadlineError<J::Error>> {
        self.schedule(event, chrono::Utc::now() + delay).await
    }

    /// Best-effort cancellation. `true` if the job was still pending; a
    /// job already firing runs to completion.
    pub async fn cancel(&self, token: &ScheduleToken) -> Result<bool, DeadlineError<J::Error>> {
        let cancelled = self
            .scheduler
            .cancel(token)
            .await
            .map_err(DeadlineError::Scheduler)?;
        debug!(token = %token, cancelled, "deadline cancellation requested");
        Ok(cancelled)
    }
}

/// The firing routine: delivers a fired job's event through the bus with
/// the three-phase callback protocol.
///
/// Per firing attempt, `before_publication` always precedes `publish`,
/// and exactly one of `after_publication_success` /
/// `after_publication_failure` follows it. When no callback is
/// registered, [`NoOpTriggerCallback`] stands in.
pub struct DeadlineDelivery<B: EventBus> {
    bus: Arc<B>,
    callback: Arc<dyn TriggerCallback>,
}

impl<B: EventBus> DeadlineDelivery<B> {
    /// Delivery with the no-op default callback.
    pub fn new(bus: Arc<B>) -> Self {
        Self {
            bus,
            callback: Arc::new(NoOpTriggerCallback),
        }
    }

    /// Register the trigger callback invoked around each delivery.
    pub fn with_callback(mut self, callback: Arc<dyn TriggerCallback>) -> Self {
        self.callback = callback;
        self
    }
}

#[async_trait]
impl<B: EventBus> JobRunner for DeadlineDelivery<B> {
    async fn run(&self, job: ScheduledJob) -> Result<(), DeliveryError> {
        debug!(token = %job.token, "firing deadline job");

        let event: EventMessage = serde_json::from_value(job.payload).map_err(|e| {
            let err = DeliveryError::Configuration(format!("undecodable event payload: {e}"));
            error!(token = %job.token, error = %err, "deadline job dropped");
            err
        })?;

        self.callback.before_publication(&event).await;
        match self.bus.publish(event).await {
            Ok(()) => {
                self.callback.after_publication_success().await;
                debug!(token = %job.token, "deadline event delivered");
                Ok(())
            }
            Err(e) => {
                self.callback.after_publication_failure(&e).await;
                warn!(token = %job.token, error = %e, "deadline delivery failed");
                Err(DeliveryError::Publish(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct MockBus {
        published: Mutex<Vec<EventMessage>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl EventBus for MockBus {
        async fn publish(&self, event: EventMessage) -> Result<(), EventBusError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EventBusError::Rejected("injected".to_string()));
            }
            self.published.lock().push(event);
            Ok(())
        }
    }

    /// Records hook invocations in order.
    #[derive(Debug, Default)]
    struct RecordingCallback {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TriggerCallback for RecordingCallback {
        async fn before_publication(&self, _event: &EventMessage) {
            self.calls.lock().push("before".to_string());
        }

        async fn after_publication_success(&self) {
            self.calls.lock().push("success".to_string());
        }

        async fn after_publication_failure(&self, _error: &EventBusError) {
            self.calls.lock().push("failure".to_string());
        }
    }

    fn job() -> ScheduledJob {
        let event = EventMessage::new("deadline.test", serde_json::json!({"n": 1}));
        ScheduledJob::new(&event, chrono::Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_successful_delivery_runs_before_then_success() {
        let bus = Arc::new(MockBus::default());
        let callback = Arc::new(RecordingCallback::default());
        let delivery = DeadlineDelivery::new(Arc::clone(&bus))
            .with_callback(Arc::clone(&callback) as Arc<dyn TriggerCallback>);

        delivery.run(job()).await.unwrap();

        assert_eq!(*callback.calls.lock(), vec!["before", "success"]);
        assert_eq!(bus.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_runs_before_then_failure_and_resignals() {
        let bus = Arc::new(MockBus::default());
        bus.fail.store(true, Ordering::SeqCst);
        let callback = Arc::new(RecordingCallback::default());
        let delivery = DeadlineDelivery::new(Arc::clone(&bus))
            .with_callback(Arc::clone(&callback) as Arc<dyn TriggerCallback>);

        let err = delivery.run(job()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Publish(_)));

        // exactly one after-hook, and it is the failure one
        assert_eq!(*callback.calls.lock(), vec!["before", "failure"]);
        assert!(bus.published.lock().is_empty());
    }

    #[tokio::test]
    async fn test_default_noop_callback_delivers_silently() {
        let bus = Arc::new(MockBus::default());
        let delivery = DeadlineDelivery::new(Arc::clone(&bus));

        delivery.run(job()).await.unwrap();
        assert_eq!(bus.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_configuration_error() {
        let bus = Arc::new(MockBus::default());
        let callback = Arc::new(RecordingCallback::default());
        let delivery = DeadlineDelivery::new(Arc::clone(&bus))
            .with_callback(Arc::clone(&callback) as Arc<dyn TriggerCallback>);

        let mut bad = job();
        bad.payload = serde_json::json!("not an event");
        let err = delivery.run(bad).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));

        // no publish attempt, no hooks
        assert!(callback.calls.lock().is_empty());
        assert!(bus.published.lock().is_empty());
    }

    #[test]
    fn test_job_status_transitions() {
        let mut job = job();
        assert_eq!(job.status, JobStatus::Scheduled);

        assert!(job.mark_firing());
        assert!(!job.mark_cancelled()); // too late to cancel
        assert_eq!(job.status, JobStatus::Firing);

        job.mark_delivered();
        assert_eq!(job.status, JobStatus::Delivered);

        let mut cancelled = super::tests::job();
        assert!(cancelled.mark_cancelled());
        assert!(!cancelled.mark_firing()); // cancelled jobs never fire
        assert_eq!(cancelled.status, JobStatus::Cancelled);
    }
}
