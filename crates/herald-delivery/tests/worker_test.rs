//! Delivery worker behavior tests over the in-memory store and a scripted
//! provider.

use std::{sync::Arc, time::Duration};

use herald_core::{
    models::{
        CampaignJob, Channel, DeliveryStatus, Event, EventId, JobStatus, Participant,
        ParticipantId, ParticipantStatus, Template, TemplateId,
    },
    Clock, SegmentRule, SegmentationConfig, TestClock,
};
use herald_delivery::{
    provider::mock::ScriptedProvider, storage::mock::MockDeliveryStore, DeliveryError,
    DeliveryWorker, SendOutcome, WorkerConfig,
};

struct Fixture {
    store: Arc<MockDeliveryStore>,
    clock: Arc<TestClock>,
    event: Event,
    template: Template,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(MockDeliveryStore::new());
        let clock = Arc::new(TestClock::new());

        let event = Event {
            id: EventId::new(),
            code: "gala25".to_string(),
            name: "Spring Gala".to_string(),
            starts_at: clock.now(),
            ends_at: clock.now() + chrono::Duration::days(1),
        };
        let template = Template {
            id: TemplateId::new(),
            event_id: event.id,
            channel: Channel::Email,
            subject: "Hello {{name}}".to_string(),
            html_body: "<p>See you at {{table}}: {{link}}</p>".to_string(),
            text_body: Some("See you at {{table}}".to_string()),
        };
        store.add_event(event.clone()).await;
        store.add_template(template.clone()).await;

        Self { store, clock, event, template }
    }

    fn worker(&self, provider: Arc<ScriptedProvider>) -> DeliveryWorker {
        DeliveryWorker::new(self.store.clone(), provider, self.clock.clone(), WorkerConfig {
            message_send_delay: Duration::from_millis(50),
            ..WorkerConfig::default()
        })
    }

    fn participant(&self, name: &str) -> Participant {
        Participant {
            id: ParticipantId::new(),
            event_id: self.event.id,
            name: name.to_string(),
            email: Some(format!("{name}@example.com")),
            phone: Some("+15550100".to_string()),
            company: None,
            language: None,
            is_vip: false,
            status: ParticipantStatus::Registered,
        }
    }

    async fn seed_participants(&self, count: usize) -> Vec<Participant> {
        let mut out = Vec::new();
        for i in 0..count {
            let p = self.participant(&format!("guest{i:02}"));
            self.store.add_participant(p.clone()).await;
            out.push(p);
        }
        out
    }

    fn job(&self, channel: Channel) -> CampaignJob {
        CampaignJob::new(
            self.event.id,
            self.template.id,
            channel,
            SegmentationConfig::all(),
            self.clock.now(),
        )
    }
}

#[tokio::test]
async fn breaker_trips_after_twenty_consecutive_failures() {
    let fixture = Fixture::new().await;
    fixture.seed_participants(30).await;
    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::failing_first(30));
    let report = fixture.worker(provider).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.breaker_tripped);
    assert_eq!(report.processed, 20);
    assert_eq!(report.fail, 20);
    assert_eq!(report.success, 0);

    // The aborted remainder has no delivery logs.
    assert_eq!(fixture.store.logs_for(job_id).await.len(), 20);

    let row = fixture.store.job(job_id).await.unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.processed_count, row.success_count + row.fail_count);
}

#[tokio::test]
async fn one_success_resets_the_breaker() {
    let fixture = Fixture::new().await;
    fixture.seed_participants(30).await;
    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    // 19 failures, then successes from recipient 20 on.
    let provider = Arc::new(ScriptedProvider::failing_first(19));
    let report = fixture.worker(provider).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert!(!report.breaker_tripped);
    assert_eq!(report.processed, 30);
    assert_eq!(report.fail, 19);
    assert_eq!(report.success, 11);
}

#[tokio::test]
async fn successful_run_merges_and_logs_every_recipient() {
    let fixture = Fixture::new().await;
    let guests = fixture.seed_participants(3).await;
    fixture.store.assign_table(guests[0].id, "Table 7").await;
    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let report = fixture.worker(provider.clone()).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.total, 3);
    assert_eq!(report.success, 3);

    let sent = provider.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].subject, "Hello guest00");
    assert!(sent[0].body.contains("Table 7"));
    assert!(sent[0].body.contains(&format!("/e/gala25/r/{}", guests[0].id)));
    // No confirmed seat falls back to the sentinel.
    assert!(sent[1].body.contains("Unassigned"));

    let logs = fixture.store.logs_for(job_id).await;
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|l| l.status == DeliveryStatus::Success && l.sent_at.is_some()));
}

#[tokio::test]
async fn missing_address_fails_that_recipient_only() {
    let fixture = Fixture::new().await;
    let mut no_email = fixture.participant("noaddress");
    no_email.email = None;
    fixture.store.add_participant(no_email.clone()).await;
    fixture.seed_participants(2).await;

    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let report = fixture.worker(provider.clone()).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.processed, 3);
    assert_eq!(report.fail, 1);
    assert_eq!(report.success, 2);
    // The provider never saw the address-less recipient.
    assert_eq!(provider.sent().len(), 2);

    let logs = fixture.store.logs_for(job_id).await;
    let failed: Vec<_> = logs.iter().filter(|l| l.status == DeliveryStatus::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].recipient_id, no_email.id);
    assert_eq!(failed[0].error_message.as_deref(), Some("no address on file"));
    assert!(failed[0].sent_at.is_none());
}

#[tokio::test]
async fn every_recipient_failing_marks_the_job_failed() {
    let fixture = Fixture::new().await;
    fixture.seed_participants(5).await;
    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::failing_first(5));
    let report = fixture.worker(provider).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Failed);
    assert!(!report.breaker_tripped);
    assert_eq!(report.fail, 5);
}

#[tokio::test]
async fn empty_segment_completes_without_sending() {
    let fixture = Fixture::new().await;
    let job = fixture.job(Channel::Email);
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let report = fixture.worker(provider.clone()).run_job(job_id).await.unwrap();

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.total, 0);
    assert!(provider.sent().is_empty());
}

#[tokio::test]
async fn segmentation_limits_the_recipient_set() {
    let fixture = Fixture::new().await;
    for i in 0..5 {
        let mut p = fixture.participant(&format!("vip{i}"));
        p.is_vip = true;
        fixture.store.add_participant(p).await;
    }
    fixture.seed_participants(10).await;

    let mut job = fixture.job(Channel::Email);
    job.segmentation = sqlx_json(SegmentationConfig {
        rules: vec![SegmentRule { kind: "vip_only".to_string(), values: Vec::new() }],
    });
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let report = fixture.worker(provider).run_job(job_id).await.unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.success, 5);
}

fn sqlx_json(config: SegmentationConfig) -> sqlx::types::Json<SegmentationConfig> {
    sqlx::types::Json(config)
}

#[tokio::test]
async fn missing_template_fails_fast_without_sends() {
    let fixture = Fixture::new().await;
    fixture.seed_participants(3).await;
    let mut job = fixture.job(Channel::Email);
    job.template_id = TemplateId::new();
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let err = fixture.worker(provider.clone()).run_job(job_id).await.unwrap_err();

    assert!(matches!(err, DeliveryError::TemplateNotFound(_)));
    assert!(provider.sent().is_empty());

    let row = fixture.store.job(job_id).await.unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.processed_count, 0);
}

#[tokio::test]
async fn run_job_rejects_non_pending_jobs() {
    let fixture = Fixture::new().await;
    let mut job = fixture.job(Channel::Email);
    job.status = JobStatus::Completed;
    let job_id = job.id;
    fixture.store.add_job(job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let worker = fixture.worker(provider);

    let err = worker.run_job(job_id).await.unwrap_err();
    assert!(matches!(
        err,
        DeliveryError::JobNotClaimable { status: JobStatus::Completed, .. }
    ));

    let unknown = herald_core::models::CampaignJobId::new();
    let err = worker.run_job(unknown).await.unwrap_err();
    assert!(matches!(err, DeliveryError::JobNotFound(_)));
}

#[tokio::test]
async fn run_next_returns_none_when_idle() {
    let fixture = Fixture::new().await;
    let provider = Arc::new(ScriptedProvider::always_succeeding());

    let report = fixture.worker(provider).run_next(false).await.unwrap();

    assert!(report.is_none());
}

#[tokio::test]
async fn message_only_worker_skips_email_jobs() {
    let fixture = Fixture::new().await;
    fixture.seed_participants(2).await;

    let email_job = fixture.job(Channel::Email);
    fixture.store.add_job(email_job).await;
    let sms_job = fixture.job(Channel::Sms);
    let sms_id = sms_job.id;
    fixture.store.add_job(sms_job).await;

    let provider = Arc::new(ScriptedProvider::always_succeeding());
    let report = fixture.worker(provider.clone()).run_next(true).await.unwrap().unwrap();

    assert_eq!(report.job_id, sms_id);
    assert!(provider.sent().iter().all(|m| m.channel == Channel::Sms));
    // Message channels get the plain-text body.
    assert!(provider.sent()[0].body.contains("See you at"));
}
