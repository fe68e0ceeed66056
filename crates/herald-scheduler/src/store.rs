//! Storage abstraction for scheduler sweeps.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use herald_core::{
    error::Result,
    models::{
        Automation, AutomationId, CampaignJob, CampaignJobId, DeliveryStatus, Event, EventId,
        FollowUp, FollowUpId, ParticipantId,
    },
};

/// Storage operations required by the scheduler.
pub trait SchedulerStore: Send + Sync + 'static {
    /// Active automations with `next_run_at <= now` (inclusive).
    fn due_automations(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Automation>>> + Send + '_>>;

    /// Active follow-ups with `next_run_at <= now` (inclusive).
    fn due_follow_ups(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FollowUp>>> + Send + '_>>;

    /// Counts due automations and follow-ups without loading them.
    fn count_due(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(i64, i64)>> + Send + '_>>;

    /// Finds an event by id.
    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>>;

    /// Inserts a new pending campaign job.
    fn create_job(
        &self,
        job: CampaignJob,
    ) -> Pin<Box<dyn Future<Output = Result<CampaignJobId>> + Send + '_>>;

    /// Records an automation firing and its next due time.
    fn mark_automation_ran(
        &self,
        id: AutomationId,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Records a follow-up firing; follow-ups never recur.
    fn mark_follow_up_ran(
        &self,
        id: FollowUpId,
        ran_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Recipient ids logged for a job, optionally filtered by outcome.
    fn log_recipients(
        &self,
        job_id: CampaignJobId,
        status: Option<DeliveryStatus>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ParticipantId>>> + Send + '_>>;
}

/// Production store backed by the Postgres repositories.
pub struct PostgresSchedulerStore {
    storage: Arc<herald_core::storage::Storage>,
}

impl PostgresSchedulerStore {
    /// Creates a new Postgres-backed scheduler store.
    pub fn new(storage: Arc<herald_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl SchedulerStore for PostgresSchedulerStore {
    fn due_automations(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Automation>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.automations.find_due(now).await })
    }

    fn due_follow_ups(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<FollowUp>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.follow_ups.find_due(now).await })
    }

    fn count_due(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(i64, i64)>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            let automations = storage.automations.count_due(now).await?;
            let follow_ups = storage.follow_ups.count_due(now).await?;
            Ok((automations, follow_ups))
        })
    }

    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.events.find_by_id(id).await })
    }

    fn create_job(
        &self,
        job: CampaignJob,
    ) -> Pin<Box<dyn Future<Output = Result<CampaignJobId>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.campaign_jobs.create(&job).await })
    }

    fn mark_automation_ran(
        &self,
        id: AutomationId,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.automations.mark_ran(id, ran_at, next_run_at).await })
    }

    fn mark_follow_up_ran(
        &self,
        id: FollowUpId,
        ran_at: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.follow_ups.mark_ran(id, ran_at).await })
    }

    fn log_recipients(
        &self,
        job_id: CampaignJobId,
        status: Option<DeliveryStatus>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ParticipantId>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_logs.recipient_ids_by_status(job_id, status).await })
    }
}

pub mod mock {
    //! In-memory scheduler store for tests.

    use std::{future::Future, pin::Pin, sync::Arc};

    use chrono::{DateTime, Utc};
    use herald_core::{
        error::Result,
        models::{
            Automation, AutomationId, CampaignJob, CampaignJobId, DeliveryStatus, Event, EventId,
            FollowUp, FollowUpId, ParticipantId,
        },
    };
    use tokio::sync::RwLock;

    use super::SchedulerStore;

    /// One simulated delivery log row.
    #[derive(Debug, Clone)]
    pub struct LoggedRecipient {
        /// Job the log belongs to.
        pub job_id: CampaignJobId,
        /// Logged recipient.
        pub recipient_id: ParticipantId,
        /// Outcome of the send.
        pub status: DeliveryStatus,
    }

    /// In-memory store seeded by tests.
    #[derive(Default)]
    pub struct MockSchedulerStore {
        automations: Arc<RwLock<Vec<Automation>>>,
        follow_ups: Arc<RwLock<Vec<FollowUp>>>,
        events: Arc<RwLock<Vec<Event>>>,
        jobs: Arc<RwLock<Vec<CampaignJob>>>,
        logs: Arc<RwLock<Vec<LoggedRecipient>>>,
    }

    impl MockSchedulerStore {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds an automation definition.
        pub async fn add_automation(&self, automation: Automation) {
            self.automations.write().await.push(automation);
        }

        /// Seeds a follow-up definition.
        pub async fn add_follow_up(&self, follow_up: FollowUp) {
            self.follow_ups.write().await.push(follow_up);
        }

        /// Seeds an event row.
        pub async fn add_event(&self, event: Event) {
            self.events.write().await.push(event);
        }

        /// Seeds a delivery log row for a base job.
        pub async fn add_log(&self, log: LoggedRecipient) {
            self.logs.write().await.push(log);
        }

        /// Jobs created during sweeps.
        pub async fn created_jobs(&self) -> Vec<CampaignJob> {
            self.jobs.read().await.clone()
        }

        /// Snapshot of one automation for assertions.
        pub async fn automation(&self, id: AutomationId) -> Option<Automation> {
            self.automations.read().await.iter().find(|a| a.id == id).cloned()
        }

        /// Snapshot of one follow-up for assertions.
        pub async fn follow_up(&self, id: FollowUpId) -> Option<FollowUp> {
            self.follow_ups.read().await.iter().find(|f| f.id == id).cloned()
        }
    }

    fn is_due(next_run_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        next_run_at.is_some_and(|t| t <= now)
    }

    impl SchedulerStore for MockSchedulerStore {
        fn due_automations(
            &self,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Automation>>> + Send + '_>> {
            let automations = self.automations.clone();
            Box::pin(async move {
                Ok(automations
                    .read()
                    .await
                    .iter()
                    .filter(|a| a.is_active && is_due(a.next_run_at, now))
                    .cloned()
                    .collect())
            })
        }

        fn due_follow_ups(
            &self,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<FollowUp>>> + Send + '_>> {
            let follow_ups = self.follow_ups.clone();
            Box::pin(async move {
                Ok(follow_ups
                    .read()
                    .await
                    .iter()
                    .filter(|f| f.is_active && is_due(f.next_run_at, now))
                    .cloned()
                    .collect())
            })
        }

        fn count_due(
            &self,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<(i64, i64)>> + Send + '_>> {
            let automations = self.automations.clone();
            let follow_ups = self.follow_ups.clone();
            Box::pin(async move {
                let a = automations
                    .read()
                    .await
                    .iter()
                    .filter(|a| a.is_active && is_due(a.next_run_at, now))
                    .count() as i64;
                let f = follow_ups
                    .read()
                    .await
                    .iter()
                    .filter(|f| f.is_active && is_due(f.next_run_at, now))
                    .count() as i64;
                Ok((a, f))
            })
        }

        fn find_event(
            &self,
            id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>> {
            let events = self.events.clone();
            Box::pin(async move {
                Ok(events.read().await.iter().find(|e| e.id == id).cloned())
            })
        }

        fn create_job(
            &self,
            job: CampaignJob,
        ) -> Pin<Box<dyn Future<Output = Result<CampaignJobId>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                let id = job.id;
                jobs.write().await.push(job);
                Ok(id)
            })
        }

        fn mark_automation_ran(
            &self,
            id: AutomationId,
            ran_at: DateTime<Utc>,
            next_run_at: Option<DateTime<Utc>>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let automations = self.automations.clone();
            Box::pin(async move {
                if let Some(a) = automations.write().await.iter_mut().find(|a| a.id == id) {
                    a.last_run_at = Some(ran_at);
                    a.next_run_at = next_run_at;
                }
                Ok(())
            })
        }

        fn mark_follow_up_ran(
            &self,
            id: FollowUpId,
            ran_at: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let follow_ups = self.follow_ups.clone();
            Box::pin(async move {
                if let Some(f) = follow_ups.write().await.iter_mut().find(|f| f.id == id) {
                    f.last_run_at = Some(ran_at);
                    f.next_run_at = None;
                }
                Ok(())
            })
        }

        fn log_recipients(
            &self,
            job_id: CampaignJobId,
            status: Option<DeliveryStatus>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<ParticipantId>>> + Send + '_>> {
            let logs = self.logs.clone();
            Box::pin(async move {
                Ok(logs
                    .read()
                    .await
                    .iter()
                    .filter(|l| l.job_id == job_id && status.is_none_or(|s| l.status == s))
                    .map(|l| l.recipient_id)
                    .collect())
            })
        }
    }
}
