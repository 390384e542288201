//! # Local Job Scheduler
//!
//! Tokio-timer-backed implementation of the deadline job port. One timer
//! task per job; the job table keeps finished jobs around so their final
//! status can be inspected. Jobs do not survive a process restart.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sagaflow_core::deadline::{JobStatus, ScheduleToken, ScheduledJob};
use sagaflow_core::port::job_scheduler::{JobRunner, JobScheduler, JobSchedulerError};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct JobEntry {
    job: Mutex<ScheduledJob>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// In-process scheduler driving one tokio timer per submitted job.
///
/// The status transition out of `Scheduled` happens under the job's
/// mutex, so a cancellation racing an in-flight firing resolves cleanly:
/// whichever claims the job first wins, the other becomes a no-op.
pub struct LocalJobScheduler {
    runner: Arc<dyn JobRunner>,
    jobs: Arc<DashMap<ScheduleToken, Arc<JobEntry>>>,
}

impl LocalJobScheduler {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            runner,
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Current status of a submitted job, if known.
    pub fn status(&self, token: &ScheduleToken) -> Option<JobStatus> {
        self.jobs.get(token).map(|entry| entry.job.lock().status)
    }

    /// Number of jobs still waiting for their fire time.
    pub fn pending_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.job.lock().status == JobStatus::Scheduled)
            .count()
    }

    /// Drop records of jobs that already reached a terminal status.
    pub fn sweep_finished(&self) {
        self.jobs.retain(|_, entry| {
            matches!(
                entry.job.lock().status,
                JobStatus::Scheduled | JobStatus::Firing
            )
        });
    }
}

#[async_trait]
impl JobScheduler for LocalJobScheduler {
    type Error = Infallible;

    async fn submit(&self, job: ScheduledJob) -> Result<(), JobSchedulerError<Self::Error>> {
        let token = job.token.clone();
        let delay = (job.fire_at - chrono::Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let entry = Arc::new(JobEntry {
            job: Mutex::new(job),
            timer: Mutex::new(None),
        });
        self.jobs.insert(token.clone(), Arc::clone(&entry));

        let runner = Arc::clone(&self.runner);
        let timer_entry = Arc::clone(&entry);
        let timer_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Claim the job before running; loses to a concurrent cancel.
            let fired = {
                let mut job = timer_entry.job.lock();
                if !job.mark_firing() {
                    return;
                }
                job.clone()
            };

            match runner.run(fired).await {
                Ok(()) => timer_entry.job.lock().mark_delivered(),
                Err(e) => {
                    warn!(token = %timer_token, error = %e, "local job delivery failed");
                    timer_entry.job.lock().mark_failed();
                }
            }
        });
        *entry.timer.lock() = Some(handle);

        debug!(token = %token, "local job submitted");
        Ok(())
    }

    async fn cancel(&self, token: &ScheduleToken) -> Result<bool, JobSchedulerError<Self::Error>> {
        let Some(entry) = self.jobs.get(token).map(|e| Arc::clone(&e)) else {
            return Ok(false);
        };

        let cancelled = entry.job.lock().mark_cancelled();
        if cancelled {
            if let Some(handle) = entry.timer.lock().take() {
                handle.abort();
            }
            debug!(token = %token, "local job cancelled");
        }
        Ok(cancelled)
    }
}
