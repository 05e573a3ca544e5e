//! Follow-up of failed scheduled runs
//!
//! A scheduled run that ends in error gets exactly one deferred re-run. The
//! re-run's own failure is logged and dropped. This is independent of the
//! permission retry inside a run, which has no cap.

use chrono::Utc;
use std::time::Duration;
use tracing::{error, warn};

use super::jobs::{IngestJob, ScheduledRetryTask};
use super::models::IngestOutcome;
use super::orchestrator::IngestOrchestrator;
use super::scheduler::SchedulerHandle;

#[derive(Debug, Clone)]
pub struct RescheduleController {
    scheduler: SchedulerHandle,
    delay: Duration,
}

impl RescheduleController {
    pub fn new(scheduler: SchedulerHandle, delay: Duration) -> Self {
        Self { scheduler, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Apply the policy to the outcome of `job` run as attempt `attempt`
    ///
    /// Returns the follow-up task when one was registered.
    pub fn handle_outcome(
        &self,
        job: &IngestJob,
        attempt: u32,
        outcome: &IngestOutcome,
    ) -> Option<ScheduledRetryTask> {
        if !outcome.is_error() {
            return None;
        }

        if attempt > 0 {
            error!(
                job = %job,
                file = %outcome.file,
                attempt,
                message = outcome.message.as_deref().unwrap_or_default(),
                "Follow-up run failed, not rescheduling"
            );
            return None;
        }

        let delay = chrono::Duration::from_std(self.delay).unwrap_or_else(|_| chrono::Duration::minutes(20));
        let task = ScheduledRetryTask::new(job.clone(), Utc::now() + delay, attempt + 1);

        match self.scheduler.schedule(task.clone()) {
            Ok(()) => {
                warn!(
                    job = %job,
                    file = %outcome.file,
                    task_id = %task.id,
                    run_at = %task.run_at,
                    "Scheduled run failed, follow-up registered"
                );
                Some(task)
            },
            Err(e) => {
                error!(job = %job, error = %e, "Could not register follow-up run");
                None
            },
        }
    }
}

/// Run `job` and hand its outcome to the controller
pub async fn run_scheduled(
    orchestrator: &IngestOrchestrator,
    controller: &RescheduleController,
    job: &IngestJob,
    attempt: u32,
) -> IngestOutcome {
    let outcome = orchestrator.execute_job(job).await;
    controller.handle_outcome(job, attempt, &outcome);
    outcome
}
