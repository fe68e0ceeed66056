//! Storage abstraction for the job queue.
//!
//! Production code goes through `herald_core::storage::Storage`; tests use
//! the in-memory mock, whose claim operation holds a single lock so the
//! compare-and-swap semantics of the real store are preserved.

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use herald_core::{
    error::Result,
    models::{QueueJob, QueueJobId},
};

/// Storage operations required by the job queue.
pub trait QueueStore: Send + Sync + 'static {
    /// Inserts a new queued job.
    fn insert(&self, job: QueueJob) -> Pin<Box<dyn Future<Output = Result<QueueJobId>> + Send + '_>>;

    /// Finds an in-flight (`queued` or `processing`) job by idempotency
    /// key.
    fn find_active_by_key(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>>;

    /// Atomically claims the oldest queued job, optionally filtered by
    /// type.
    ///
    /// Must be a single compare-and-swap against the store: a losing racer
    /// observes `None`, never a double claim.
    fn claim_next(
        &self,
        job_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>>;

    /// Marks a job as successfully completed.
    fn mark_done(
        &self,
        id: QueueJobId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns a failed job to `queued` with the given retry count.
    fn release_for_retry(
        &self,
        id: QueueJobId,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Marks a job as terminally failed.
    fn mark_failed(
        &self,
        id: QueueJobId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Finds a job by id.
    fn find_by_id(
        &self,
        id: QueueJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>>;
}

/// Production store backed by the Postgres repositories.
pub struct PostgresQueueStore {
    storage: Arc<herald_core::storage::Storage>,
}

impl PostgresQueueStore {
    /// Creates a new Postgres-backed queue store.
    pub fn new(storage: Arc<herald_core::storage::Storage>) -> Self {
        Self { storage }
    }
}

impl QueueStore for PostgresQueueStore {
    fn insert(
        &self,
        job: QueueJob,
    ) -> Pin<Box<dyn Future<Output = Result<QueueJobId>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue_jobs.create(&job).await })
    }

    fn find_active_by_key(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        let key = key.to_string();
        Box::pin(async move { storage.queue_jobs.find_active_by_key(&key).await })
    }

    fn claim_next(
        &self,
        job_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        let job_type = job_type.map(str::to_string);
        Box::pin(async move { storage.queue_jobs.claim_next(job_type.as_deref(), now).await })
    }

    fn mark_done(
        &self,
        id: QueueJobId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue_jobs.mark_done(id, now).await })
    }

    fn release_for_retry(
        &self,
        id: QueueJobId,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        let error = error.to_string();
        Box::pin(async move {
            storage.queue_jobs.release_for_retry(id, retry_count, &error, now).await
        })
    }

    fn mark_failed(
        &self,
        id: QueueJobId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        let error = error.to_string();
        Box::pin(async move { storage.queue_jobs.mark_failed(id, &error, now).await })
    }

    fn find_by_id(
        &self,
        id: QueueJobId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.queue_jobs.find_by_id(id).await })
    }
}

pub mod mock {
    //! In-memory queue store for tests.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use chrono::{DateTime, Utc};
    use herald_core::{
        error::Result,
        models::{QueueJob, QueueJobId, QueueStatus},
    };
    use tokio::sync::Mutex;

    use super::QueueStore;

    /// In-memory store with the same claim semantics as Postgres.
    ///
    /// All jobs live behind one mutex; `claim_next` inspects and flips the
    /// status while holding it, so two concurrent claimers can never both
    /// win one job.
    pub struct MockQueueStore {
        jobs: Arc<Mutex<HashMap<QueueJobId, QueueJob>>>,
    }

    impl MockQueueStore {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self {
                jobs: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        /// Snapshot of one job for assertions.
        pub async fn job(&self, id: QueueJobId) -> Option<QueueJob> {
            self.jobs.lock().await.get(&id).cloned()
        }

        /// Number of stored rows, across all statuses.
        pub async fn len(&self) -> usize {
            self.jobs.lock().await.len()
        }

        /// True when no rows are stored.
        pub async fn is_empty(&self) -> bool {
            self.jobs.lock().await.is_empty()
        }
    }

    impl Default for MockQueueStore {
        fn default() -> Self {
            Self::new()
        }
    }

    impl QueueStore for MockQueueStore {
        fn insert(
            &self,
            job: QueueJob,
        ) -> Pin<Box<dyn Future<Output = Result<QueueJobId>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                let id = job.id;
                jobs.lock().await.insert(id, job);
                Ok(id)
            })
        }

        fn find_active_by_key(
            &self,
            key: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            let key = key.to_string();
            Box::pin(async move {
                let jobs = jobs.lock().await;
                Ok(jobs
                    .values()
                    .find(|j| {
                        j.idempotency_key.as_deref() == Some(key.as_str())
                            && matches!(j.status, QueueStatus::Queued | QueueStatus::Processing)
                    })
                    .cloned())
            })
        }

        fn claim_next(
            &self,
            job_type: Option<&str>,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            let job_type = job_type.map(str::to_string);
            Box::pin(async move {
                let mut jobs = jobs.lock().await;
                let candidate = jobs
                    .values()
                    .filter(|j| j.status == QueueStatus::Queued)
                    .filter(|j| job_type.as_deref().is_none_or(|t| j.job_type == t))
                    .min_by_key(|j| j.created_at)
                    .map(|j| j.id);

                match candidate {
                    Some(id) => {
                        let job = jobs.get_mut(&id).ok_or_else(|| {
                            herald_core::CoreError::NotFound(format!("queue job {id} vanished"))
                        })?;
                        job.status = QueueStatus::Processing;
                        job.started_at = Some(now);
                        job.updated_at = now;
                        Ok(Some(job.clone()))
                    },
                    None => Ok(None),
                }
            })
        }

        fn mark_done(
            &self,
            id: QueueJobId,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move {
                if let Some(job) = jobs.lock().await.get_mut(&id) {
                    job.status = QueueStatus::Done;
                    job.completed_at = Some(now);
                    job.updated_at = now;
                    job.error_message = None;
                }
                Ok(())
            })
        }

        fn release_for_retry(
            &self,
            id: QueueJobId,
            retry_count: i32,
            error: &str,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            let error = error.to_string();
            Box::pin(async move {
                if let Some(job) = jobs.lock().await.get_mut(&id) {
                    job.status = QueueStatus::Queued;
                    job.retry_count = retry_count;
                    job.error_message = Some(error);
                    job.updated_at = now;
                }
                Ok(())
            })
        }

        fn mark_failed(
            &self,
            id: QueueJobId,
            error: &str,
            now: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let jobs = self.jobs.clone();
            let error = error.to_string();
            Box::pin(async move {
                if let Some(job) = jobs.lock().await.get_mut(&id) {
                    job.status = QueueStatus::Failed;
                    job.error_message = Some(error);
                    job.completed_at = Some(now);
                    job.updated_at = now;
                }
                Ok(())
            })
        }

        fn find_by_id(
            &self,
            id: QueueJobId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<QueueJob>>> + Send + '_>> {
            let jobs = self.jobs.clone();
            Box::pin(async move { Ok(jobs.lock().await.get(&id).cloned()) })
        }
    }
}
