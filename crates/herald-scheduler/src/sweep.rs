//! One scheduler sweep: evaluate due definitions, create jobs, reschedule.
//!
//! Every definition is one-shot: after it fires, `next_run_at` is cleared
//! and the console must arm it again for another run. Per-item failures are
//! isolated so one broken definition never blocks the rest of the sweep.

use std::sync::Arc;

use herald_core::{
    models::{
        Automation, CampaignJob, CampaignJobId, DeliveryStatus, FollowUp, FollowUpTrigger,
    },
    Clock, CoreError, Result, SegmentationConfig,
};
use tracing::{info, warn};

use crate::store::SchedulerStore;

/// Counts and job ids produced by one sweep.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SweepReport {
    /// Automations that fired (job created and rescheduled).
    pub automations_processed: usize,
    /// Follow-ups that fired, including "ran, nothing to do".
    pub follow_ups_processed: usize,
    /// Campaign jobs created this sweep.
    pub created_jobs: Vec<CampaignJobId>,
    /// Per-item failures, skipped without blocking the sweep.
    pub errors: Vec<String>,
}

/// Evaluates automation and follow-up definitions.
pub struct Scheduler {
    store: Arc<dyn SchedulerStore>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Creates a scheduler over the given store and clock.
    pub fn new(store: Arc<dyn SchedulerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Runs one full sweep over all due automations and follow-ups.
    ///
    /// # Errors
    ///
    /// Returns error only when the due lists themselves cannot be loaded;
    /// individual definition failures are collected in the report.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for automation in self.store.due_automations(now).await? {
            let id = automation.id;
            match self.fire_automation(automation).await {
                Ok(job_id) => {
                    report.automations_processed += 1;
                    report.created_jobs.push(job_id);
                },
                Err(e) => {
                    warn!(automation_id = %id, error = %e, "automation skipped");
                    report.errors.push(format!("automation {id}: {e}"));
                },
            }
        }

        for follow_up in self.store.due_follow_ups(now).await? {
            let id = follow_up.id;
            match self.fire_follow_up(follow_up).await {
                Ok(job_id) => {
                    report.follow_ups_processed += 1;
                    if let Some(job_id) = job_id {
                        report.created_jobs.push(job_id);
                    }
                },
                Err(e) => {
                    warn!(follow_up_id = %id, error = %e, "follow-up skipped");
                    report.errors.push(format!("follow-up {id}: {e}"));
                },
            }
        }

        info!(
            automations = report.automations_processed,
            follow_ups = report.follow_ups_processed,
            created = report.created_jobs.len(),
            errors = report.errors.len(),
            "scheduler sweep finished"
        );

        Ok(report)
    }

    /// Due counts for the cheap status endpoint; performs no work.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn due_counts(&self) -> Result<(i64, i64)> {
        self.store.count_due(self.clock.now()).await
    }

    async fn fire_automation(&self, automation: Automation) -> Result<CampaignJobId> {
        // The owning event must exist before a job referencing it is
        // created.
        let now = self.clock.now();
        self.store.find_event(automation.event_id).await?.ok_or_else(|| {
            CoreError::NotFound(format!("event {} for automation", automation.event_id))
        })?;

        let job = CampaignJob::new(
            automation.event_id,
            automation.template_id,
            automation.channel,
            automation.segmentation.0.clone(),
            now,
        );
        let job_id = self.store.create_job(job).await?;

        self.store.mark_automation_ran(automation.id, now, None).await?;

        info!(automation_id = %automation.id, job_id = %job_id, "automation fired");
        Ok(job_id)
    }

    /// Fires one follow-up. Returns `None` when its target set was empty
    /// and no job was created.
    async fn fire_follow_up(&self, follow_up: FollowUp) -> Result<Option<CampaignJobId>> {
        let now = self.clock.now();
        let status_filter = match follow_up.trigger_type {
            FollowUpTrigger::OnFail => Some(DeliveryStatus::Failed),
            FollowUpTrigger::OnSuccess => Some(DeliveryStatus::Success),
            FollowUpTrigger::AfterHours => None,
        };

        let recipients =
            self.store.log_recipients(follow_up.base_job_id, status_filter).await?;

        if recipients.is_empty() {
            // Ran, nothing to do: the definition is still consumed.
            self.store.mark_follow_up_ran(follow_up.id, now).await?;
            info!(follow_up_id = %follow_up.id, "follow-up had no target recipients");
            return Ok(None);
        }

        self.store.find_event(follow_up.event_id).await?.ok_or_else(|| {
            CoreError::NotFound(format!("event {} for follow-up", follow_up.event_id))
        })?;

        let job = CampaignJob::new(
            follow_up.event_id,
            follow_up.template_id,
            follow_up.channel,
            SegmentationConfig::custom(&recipients),
            now,
        );
        let job_id = self.store.create_job(job).await?;

        self.store.mark_follow_up_ran(follow_up.id, now).await?;

        info!(
            follow_up_id = %follow_up.id,
            job_id = %job_id,
            targets = recipients.len(),
            "follow-up fired"
        );
        Ok(Some(job_id))
    }
}
