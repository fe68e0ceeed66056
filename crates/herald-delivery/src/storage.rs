//! Storage abstraction for the delivery worker.
//!
//! Production goes through `herald_core::storage::Storage`; tests use the
//! in-memory mock. Claim operations keep the real store's conditional
//! semantics so race behavior matches production.

use std::{future::Future, pin::Pin, sync::Arc};

use herald_core::{
    error::Result,
    models::{
        CampaignJob, CampaignJobId, DeliveryLog, Event, EventId, JobStatus, Participant,
        ParticipantId, Template, TemplateId,
    },
};

/// Storage operations required by the delivery worker.
pub trait DeliveryStore: Send + Sync + 'static {
    /// Atomically claims the oldest pending job, skipping email jobs when
    /// `message_only` is set.
    fn claim_oldest_pending(
        &self,
        message_only: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>>;

    /// Atomically claims one job if it is still pending.
    fn claim_by_id(
        &self,
        id: CampaignJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>>;

    /// Finds a job without claiming it.
    fn find_job(
        &self,
        id: CampaignJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>>;

    /// Finds a template by id.
    fn find_template(
        &self,
        id: TemplateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Template>>> + Send + '_>>;

    /// Finds an event by id.
    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>>;

    /// All participants of an event, before segmentation.
    fn list_participants(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Participant>>> + Send + '_>>;

    /// The recipient's confirmed table name, if seated. Looked up
    /// just-in-time per recipient.
    fn confirmed_table_name(
        &self,
        id: ParticipantId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>>;

    /// Records the resolved recipient count.
    fn set_total(
        &self,
        id: CampaignJobId,
        total: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Persists a mid-run counter checkpoint.
    fn checkpoint_counters(
        &self,
        id: CampaignJobId,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Writes the terminal status and final counters.
    fn finish(
        &self,
        id: CampaignJobId,
        status: JobStatus,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Appends one delivery log row.
    fn append_log(
        &self,
        log: DeliveryLog,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production store backed by the Postgres repositories.
pub struct PostgresDeliveryStore {
    storage: Arc<herald_core::storage::Storage>,
}

impl PostgresDeliveryStore {
    /// Creates a new Postgres-backed delivery store.
    pub fn new(storage: Arc<herald_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl DeliveryStore for PostgresDeliveryStore {
    fn claim_oldest_pending(
        &self,
        message_only: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.campaign_jobs.claim_oldest_pending(message_only).await })
    }

    fn claim_by_id(
        &self,
        id: CampaignJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.campaign_jobs.claim_by_id(id).await })
    }

    fn find_job(
        &self,
        id: CampaignJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.campaign_jobs.find_by_id(id).await })
    }

    fn find_template(
        &self,
        id: TemplateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Template>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.templates.find_by_id(id).await })
    }

    fn find_event(
        &self,
        id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.events.find_by_id(id).await })
    }

    fn list_participants(
        &self,
        event_id: EventId,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Participant>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.participants.list_by_event(event_id).await })
    }

    fn confirmed_table_name(
        &self,
        id: ParticipantId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.participants.confirmed_table_name(id).await })
    }

    fn set_total(
        &self,
        id: CampaignJobId,
        total: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.campaign_jobs.set_total(id, total).await })
    }

    fn checkpoint_counters(
        &self,
        id: CampaignJobId,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.campaign_jobs.checkpoint_counters(id, processed, success, fail).await
        })
    }

    fn finish(
        &self,
        id: CampaignJobId,
        status: JobStatus,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.campaign_jobs.finish(id, status, processed, success, fail).await
        })
    }

    fn append_log(
        &self,
        log: DeliveryLog,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.delivery_logs.create(&log).await })
    }
}

pub mod mock {
    //! In-memory delivery store for tests.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use herald_core::{
        error::Result,
        models::{
            CampaignJob, CampaignJobId, Channel, DeliveryLog, Event, EventId, JobStatus,
            Participant, ParticipantId, Template, TemplateId,
        },
    };
    use tokio::sync::RwLock;

    use super::DeliveryStore;

    /// In-memory store with claim semantics matching Postgres.
    #[derive(Default)]
    pub struct MockDeliveryStore {
        jobs: Arc<RwLock<HashMap<CampaignJobId, CampaignJob>>>,
        templates: Arc<RwLock<HashMap<TemplateId, Template>>>,
        events: Arc<RwLock<HashMap<EventId, Event>>>,
        participants: Arc<RwLock<Vec<Participant>>>,
        tables: Arc<RwLock<HashMap<ParticipantId, String>>>,
        logs: Arc<RwLock<Vec<DeliveryLog>>>,
    }

    impl MockDeliveryStore {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a job row.
        pub async fn add_job(&self, job: CampaignJob) {
            self.jobs.write().await.insert(job.id, job);
        }

        /// Seeds a template row.
        pub async fn add_template(&self, template: Template) {
            self.templates.write().await.insert(template.id, template);
        }

        /// Seeds an event row.
        pub async fn add_event(&self, event: Event) {
            self.events.write().await.insert(event.id, event);
        }

        /// Seeds a participant row.
        pub async fn add_participant(&self, participant: Participant) {
            self.participants.write().await.push(participant);
        }

        /// Seeds a confirmed table assignment.
        pub async fn assign_table(&self, participant_id: ParticipantId, table: &str) {
            self.tables.write().await.insert(participant_id, table.to_string());
        }

        /// Snapshot of one job for assertions.
        pub async fn job(&self, id: CampaignJobId) -> Option<CampaignJob> {
            self.jobs.read().await.get(&id).cloned()
        }

        /// All delivery logs written for a job, in insertion order.
        pub async fn logs_for(&self, id: CampaignJobId) -> Vec<DeliveryLog> {
            self.logs.read().await.iter().filter(|l| l.job_id == id).cloned().collect()
        }
    }

    impl DeliveryStore for MockDeliveryStore {
        fn claim_oldest_pending(
            &self,
            message_only: bool,
        ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                let mut jobs = jobs.write().await;
                let candidate = jobs
                    .values()
                    .filter(|j| j.status == JobStatus::Pending)
                    .filter(|j| !message_only || j.channel != Channel::Email)
                    .min_by_key(|j| j.created_at)
                    .map(|j| j.id);

                Ok(candidate.and_then(|id| {
                    jobs.get_mut(&id).map(|job| {
                        job.status = JobStatus::Processing;
                        job.clone()
                    })
                }))
            })
        }

        fn claim_by_id(
            &self,
            id: CampaignJobId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                let mut jobs = jobs.write().await;
                Ok(jobs.get_mut(&id).filter(|j| j.status == JobStatus::Pending).map(|job| {
                    job.status = JobStatus::Processing;
                    job.clone()
                }))
            })
        }

        fn find_job(
            &self,
            id: CampaignJobId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<CampaignJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move { Ok(jobs.read().await.get(&id).cloned()) })
        }

        fn find_template(
            &self,
            id: TemplateId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Template>>> + Send + '_>> {
            let templates = self.templates.clone();
            Box::pin(async move { Ok(templates.read().await.get(&id).cloned()) })
        }

        fn find_event(
            &self,
            id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Event>>> + Send + '_>> {
            let events = self.events.clone();
            Box::pin(async move { Ok(events.read().await.get(&id).cloned()) })
        }

        fn list_participants(
            &self,
            event_id: EventId,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Participant>>> + Send + '_>> {
            let participants = self.participants.clone();
            Box::pin(async move {
                Ok(participants
                    .read()
                    .await
                    .iter()
                    .filter(|p| p.event_id == event_id)
                    .cloned()
                    .collect())
            })
        }

        fn confirmed_table_name(
            &self,
            id: ParticipantId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + '_>> {
            let tables = self.tables.clone();
            Box::pin(async move { Ok(tables.read().await.get(&id).cloned()) })
        }

        fn set_total(
            &self,
            id: CampaignJobId,
            total: i32,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                if let Some(job) = jobs.write().await.get_mut(&id) {
                    job.total_count = total;
                }
                Ok(())
            })
        }

        fn checkpoint_counters(
            &self,
            id: CampaignJobId,
            processed: i32,
            success: i32,
            fail: i32,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                if let Some(job) = jobs.write().await.get_mut(&id) {
                    job.processed_count = processed;
                    job.success_count = success;
                    job.fail_count = fail;
                }
                Ok(())
            })
        }

        fn finish(
            &self,
            id: CampaignJobId,
            status: JobStatus,
            processed: i32,
            success: i32,
            fail: i32,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                if let Some(job) = jobs.write().await.get_mut(&id) {
                    job.status = status;
                    job.processed_count = processed;
                    job.success_count = success;
                    job.fail_count = fail;
                }
                Ok(())
            })
        }

        fn append_log(
            &self,
            log: DeliveryLog,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let logs = self.logs.clone();
            Box::pin(async move {
                logs.write().await.push(log);
                Ok(())
            })
        }
    }
}
