//! Job scheduler
//!
//! One background task fires the daily "yesterday" run and executes deferred
//! one-shot tasks submitted through a [`SchedulerHandle`]. Everything stops
//! when the shutdown token is cancelled; pending deferred tasks are dropped.

use chrono::{Local, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::ScheduleConfig;
use super::jobs::{IngestJob, ScheduledRetryTask};
use super::orchestrator::IngestOrchestrator;
use super::retry::{run_scheduled, RescheduleController};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Scheduler is not running")]
    Closed,
}

/// Submits deferred tasks to a running [`JobScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduledRetryTask>,
}

impl SchedulerHandle {
    /// A handle and the receiving end a scheduler drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScheduledRetryTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn schedule(&self, task: ScheduledRetryTask) -> Result<(), ScheduleError> {
        self.tx.send(task).map_err(|_| ScheduleError::Closed)
    }
}

/// Job scheduler
pub struct JobScheduler {
    orchestrator: Arc<IngestOrchestrator>,
    config: ScheduleConfig,
    shutdown: CancellationToken,
    handle: SchedulerHandle,
    receiver: mpsc::UnboundedReceiver<ScheduledRetryTask>,
}

impl JobScheduler {
    pub fn new(
        orchestrator: Arc<IngestOrchestrator>,
        config: ScheduleConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (handle, receiver) = SchedulerHandle::channel();
        Self {
            orchestrator,
            config,
            shutdown,
            handle,
            receiver,
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Controller that reschedules through this scheduler
    pub fn controller(&self) -> RescheduleController {
        RescheduleController::new(self.handle.clone(), self.config.reschedule_delay())
    }

    /// Spawn the scheduler loop
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let controller = self.controller();

        if self.config.enabled {
            info!(daily_at = %self.config.daily_at, "Job scheduler started");
        } else {
            info!("Job scheduler started, daily run disabled");
        }

        loop {
            let wait = until_next_run(Local::now().naive_local(), self.config.daily_at);

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait), if self.config.enabled => {
                    self.spawn_run(ScheduledRetryTask::new(IngestJob::Yesterday, Utc::now(), 0), &controller);
                }
                Some(task) = self.receiver.recv() => {
                    self.spawn_run(task, &controller);
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Run `task` once its time has come, unless shutdown comes first
    fn spawn_run(&self, task: ScheduledRetryTask, controller: &RescheduleController) {
        let orchestrator = self.orchestrator.clone();
        let controller = controller.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let wait = (task.run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if task.is_follow_up() {
                info!(task_id = %task.id, job = %task.job, run_at = %task.run_at, "Follow-up run pending");
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    warn!(task_id = %task.id, job = %task.job, "Pending run dropped on shutdown");
                }
                _ = tokio::time::sleep(wait) => {
                    let outcome = run_scheduled(&orchestrator, &controller, &task.job, task.attempt).await;
                    info!(
                        task_id = %task.id,
                        job = %task.job,
                        attempt = task.attempt,
                        status = ?outcome.status,
                        "Scheduled run finished"
                    );
                }
            }
        });
    }
}

/// Time from `now` until the next `at`, tomorrow if `at` has passed today
pub fn until_next_run(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 18)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert_eq!(until_next_run(at(5, 30, 0), six), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_next_run_tomorrow() {
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        assert_eq!(until_next_run(at(6, 0, 0), six), Duration::from_secs(24 * 3600));
        assert_eq!(until_next_run(at(7, 0, 0), six), Duration::from_secs(23 * 3600));
    }

    #[test]
    fn test_handle_fails_once_scheduler_is_gone() {
        let (handle, rx) = SchedulerHandle::channel();
        drop(rx);
        let task = ScheduledRetryTask::new(IngestJob::Yesterday, Utc::now(), 1);
        assert!(matches!(handle.schedule(task), Err(ScheduleError::Closed)));
    }
}
