//! The sequential delivery worker.
//!
//! One invocation runs exactly one campaign job to a terminal state. There
//! is no long-running loop: the HTTP layer (or a test) calls `run_next` or
//! `run_job` once per external trigger, and overlapping invocations are
//! kept off the same job by the store's conditional claim.
//!
//! Once a run starts it is never interrupted from outside; `stopped` and
//! `failed_manual` are administrative markers applied to jobs that have not
//! been claimed yet, and the loop does not check for them.

use std::{sync::Arc, time::Duration};

use herald_core::{
    models::{
        CampaignJob, CampaignJobId, Channel, DeliveryLog, DeliveryStatus, Event, JobStatus,
        Participant, Template,
    },
    render, segment, Clock,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{DeliveryError, Result},
    progress::{RunPolicy, RunProgress, StepDecision},
    provider::{SendOutcome, SendProvider},
    storage::DeliveryStore,
};

/// Worker tunables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Breaker threshold and checkpoint cadence.
    pub policy: RunPolicy,
    /// Inter-recipient delay for email jobs. Bulk email tolerates zero.
    pub email_send_delay: Duration,
    /// Inter-recipient delay for sms/chat jobs. Gateways throttle hard, so
    /// this should stay non-zero in production.
    pub message_send_delay: Duration,
    /// Base URL for per-recipient deep links.
    pub link_base: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            policy: RunPolicy::default(),
            email_send_delay: Duration::ZERO,
            message_send_delay: Duration::from_millis(200),
            link_base: "http://localhost:8080".to_string(),
        }
    }
}

/// Final counters of one job run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    /// The job that ran.
    pub job_id: CampaignJobId,
    /// Terminal status.
    pub status: JobStatus,
    /// Resolved recipient count.
    pub total: i32,
    /// Recipients attempted.
    pub processed: i32,
    /// Successful sends.
    pub success: i32,
    /// Failed sends.
    pub fail: i32,
    /// Whether the circuit breaker aborted the run.
    pub breaker_tripped: bool,
}

/// Runs campaign jobs one at a time.
pub struct DeliveryWorker {
    store: Arc<dyn DeliveryStore>,
    provider: Arc<dyn SendProvider>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl DeliveryWorker {
    /// Creates a worker over the given store, provider, and clock.
    pub fn new(
        store: Arc<dyn DeliveryStore>,
        provider: Arc<dyn SendProvider>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self { store, provider, clock, config }
    }

    /// Claims and runs the oldest pending job. Returns `None` when nothing
    /// is claimable.
    ///
    /// With `message_only` set, email jobs are left for the email-capable
    /// worker path.
    ///
    /// # Errors
    ///
    /// Returns error on validation failures (missing template or event) or
    /// when storage is unreachable.
    pub async fn run_next(&self, message_only: bool) -> Result<Option<RunReport>> {
        match self.store.claim_oldest_pending(message_only).await? {
            Some(job) => self.process(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Claims and runs one specific job.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::JobNotFound`] for an unknown id and
    /// [`DeliveryError::JobNotClaimable`] when the job has already left
    /// `pending` (including a concurrent invocation winning the claim).
    pub async fn run_job(&self, id: CampaignJobId) -> Result<RunReport> {
        match self.store.claim_by_id(id).await? {
            Some(job) => self.process(job).await,
            None => match self.store.find_job(id).await? {
                Some(job) => Err(DeliveryError::JobNotClaimable { id, status: job.status }),
                None => Err(DeliveryError::JobNotFound(id)),
            },
        }
    }

    /// Runs one claimed job to a terminal state.
    async fn process(&self, job: CampaignJob) -> Result<RunReport> {
        // Validation failures mark the job failed before any send happens.
        let Some(template) = self.store.find_template(job.template_id).await? else {
            self.fail_before_sending(&job).await?;
            return Err(DeliveryError::TemplateNotFound(job.id));
        };
        let Some(event) = self.store.find_event(job.event_id).await? else {
            self.fail_before_sending(&job).await?;
            return Err(DeliveryError::EventNotFound(job.id));
        };
        let participants = match self.store.list_participants(job.event_id).await {
            Ok(participants) => participants,
            Err(e) => {
                self.fail_before_sending(&job).await?;
                return Err(e.into());
            },
        };

        let recipients = segment::resolve(participants, &job.segmentation.0);
        let total = i32::try_from(recipients.len()).unwrap_or(i32::MAX);
        self.store.set_total(job.id, total).await?;

        info!(
            job_id = %job.id,
            channel = %job.channel,
            total,
            "campaign run started"
        );

        let delay = match job.channel {
            Channel::Email => self.config.email_send_delay,
            Channel::Sms | Channel::Chat => self.config.message_send_delay,
        };

        let mut progress = RunProgress::new();
        let mut breaker_tripped = false;

        for (i, recipient) in recipients.iter().enumerate() {
            let outcome = self.send_one(&template, &event, recipient, job.channel).await;
            self.log_outcome(&job, recipient, &outcome).await?;

            let (next, decision) = progress.step(outcome.success, &self.config.policy);
            progress = next;

            match decision {
                StepDecision::Abort => {
                    breaker_tripped = true;
                    warn!(
                        job_id = %job.id,
                        processed = progress.processed,
                        consecutive = progress.consecutive_failures,
                        "circuit breaker tripped, aborting remaining recipients"
                    );
                    break;
                },
                StepDecision::Continue { checkpoint: true } => {
                    self.store
                        .checkpoint_counters(
                            job.id,
                            progress.processed,
                            progress.success,
                            progress.fail,
                        )
                        .await?;
                },
                StepDecision::Continue { checkpoint: false } => {},
            }

            if i + 1 < recipients.len() && !delay.is_zero() {
                self.clock.sleep(delay).await;
            }
        }

        let status = if breaker_tripped || progress.all_failed(total) {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.store
            .finish(job.id, status, progress.processed, progress.success, progress.fail)
            .await?;

        info!(
            job_id = %job.id,
            status = %status,
            processed = progress.processed,
            success = progress.success,
            fail = progress.fail,
            "campaign run finished"
        );

        Ok(RunReport {
            job_id: job.id,
            status,
            total,
            processed: progress.processed,
            success: progress.success,
            fail: progress.fail,
            breaker_tripped,
        })
    }

    /// Merges and sends to one recipient, folding every per-recipient
    /// problem into a failed outcome so the loop always continues.
    async fn send_one(
        &self,
        template: &Template,
        event: &Event,
        recipient: &Participant,
        channel: Channel,
    ) -> SendOutcome {
        let Some(address) = recipient.address_for(channel) else {
            return SendOutcome::failure("no address on file");
        };

        let table = match self.store.confirmed_table_name(recipient.id).await {
            Ok(table) => table,
            Err(e) => return SendOutcome::failure(format!("table lookup failed: {e}")),
        };

        let vars = render::recipient_vars(event, recipient, table, &self.config.link_base);
        let message = render::merge(template, &vars);

        match channel {
            Channel::Email => {
                let text = (!message.text.is_empty()).then_some(message.text.as_str());
                self.provider.send_email(address, &message.subject, &message.html, text).await
            },
            Channel::Sms | Channel::Chat => {
                let body = if message.text.is_empty() { &message.html } else { &message.text };
                self.provider.send_message(channel, address, body).await
            },
        }
    }

    async fn log_outcome(
        &self,
        job: &CampaignJob,
        recipient: &Participant,
        outcome: &SendOutcome,
    ) -> Result<()> {
        let now = self.clock.now();
        let log = DeliveryLog {
            id: Uuid::new_v4(),
            job_id: job.id,
            recipient_id: recipient.id,
            address: recipient.address_for(job.channel).unwrap_or_default().to_string(),
            status: if outcome.success { DeliveryStatus::Success } else { DeliveryStatus::Failed },
            error_message: outcome.error.clone(),
            sent_at: outcome.success.then_some(now),
        };
        self.store.append_log(log).await?;
        Ok(())
    }

    async fn fail_before_sending(&self, job: &CampaignJob) -> Result<()> {
        self.store.finish(job.id, JobStatus::Failed, 0, 0, 0).await?;
        Ok(())
    }
}
