//! Sweep behavior tests over the in-memory scheduler store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use herald_core::{
    models::{
        Automation, AutomationId, AutomationKind, CampaignJobId, Channel, DeliveryStatus, Event,
        EventId, FollowUp, FollowUpId, FollowUpTrigger, ParticipantId, TemplateId, TimeType,
    },
    SegmentationConfig, TestClock,
};
use herald_scheduler::{store::mock::LoggedRecipient, store::mock::MockSchedulerStore, Scheduler};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn event() -> Event {
    Event {
        id: EventId::new(),
        code: "gala25".to_string(),
        name: "Spring Gala".to_string(),
        starts_at: base_time() + Duration::days(7),
        ends_at: base_time() + Duration::days(8),
    }
}

fn automation(event_id: EventId, next_run_at: Option<DateTime<Utc>>) -> Automation {
    Automation {
        id: AutomationId::new(),
        event_id,
        template_id: TemplateId::new(),
        channel: Channel::Email,
        kind: AutomationKind::TimeBased,
        time_type: Some(TimeType::Absolute),
        send_at: next_run_at,
        offset_days: None,
        trigger_kind: None,
        segmentation: sqlx::types::Json(SegmentationConfig::all()),
        is_active: true,
        last_run_at: None,
        next_run_at,
    }
}

fn follow_up(
    event_id: EventId,
    base_job_id: CampaignJobId,
    trigger: FollowUpTrigger,
    next_run_at: Option<DateTime<Utc>>,
) -> FollowUp {
    FollowUp {
        id: FollowUpId::new(),
        event_id,
        template_id: TemplateId::new(),
        channel: Channel::Email,
        base_job_id,
        trigger_type: trigger,
        delay_hours: matches!(trigger, FollowUpTrigger::AfterHours).then_some(24),
        segmentation: sqlx::types::Json(SegmentationConfig::all()),
        is_active: true,
        last_run_at: None,
        next_run_at,
    }
}

fn scheduler(store: Arc<MockSchedulerStore>) -> Scheduler {
    Scheduler::new(store, Arc::new(TestClock::at(base_time())))
}

#[tokio::test]
async fn due_at_exactly_now_fires_but_future_does_not() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;

    let due = automation(ev.id, Some(base_time()));
    let future = automation(ev.id, Some(base_time() + Duration::seconds(1)));
    let due_id = due.id;
    let future_id = future.id;
    store.add_automation(due).await;
    store.add_automation(future).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.automations_processed, 1);
    assert_eq!(report.created_jobs.len(), 1);
    assert!(store.automation(due_id).await.unwrap().last_run_at.is_some());
    assert!(store.automation(future_id).await.unwrap().last_run_at.is_none());
}

#[tokio::test]
async fn fired_automation_is_one_shot_and_spawns_a_matching_job() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;
    let a = automation(ev.id, Some(base_time() - Duration::hours(1)));
    let a_id = a.id;
    let template_id = a.template_id;
    store.add_automation(a).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert!(report.errors.is_empty());
    let jobs = store.created_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].event_id, ev.id);
    assert_eq!(jobs[0].template_id, template_id);
    assert_eq!(jobs[0].channel, Channel::Email);

    let row = store.automation(a_id).await.unwrap();
    assert_eq!(row.last_run_at, Some(base_time()));
    assert!(row.next_run_at.is_none());
}

#[tokio::test]
async fn inactive_definitions_are_skipped() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;
    let mut a = automation(ev.id, Some(base_time()));
    a.is_active = false;
    store.add_automation(a).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.automations_processed, 0);
    assert!(store.created_jobs().await.is_empty());
}

#[tokio::test]
async fn one_broken_automation_does_not_block_the_rest() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;

    // References an event that does not exist.
    let broken = automation(EventId::new(), Some(base_time()));
    let healthy = automation(ev.id, Some(base_time()));
    let healthy_id = healthy.id;
    store.add_automation(broken).await;
    store.add_automation(healthy).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.automations_processed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(store.automation(healthy_id).await.unwrap().last_run_at.is_some());
}

#[tokio::test]
async fn on_fail_follow_up_targets_only_failed_recipients() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;

    let base_job = CampaignJobId::new();
    let failed_a = ParticipantId::new();
    let failed_b = ParticipantId::new();
    let succeeded = ParticipantId::new();
    for (recipient_id, status) in [
        (failed_a, DeliveryStatus::Failed),
        (failed_b, DeliveryStatus::Failed),
        (succeeded, DeliveryStatus::Success),
    ] {
        store.add_log(LoggedRecipient { job_id: base_job, recipient_id, status }).await;
    }

    let f = follow_up(ev.id, base_job, FollowUpTrigger::OnFail, Some(base_time()));
    let f_id = f.id;
    store.add_follow_up(f).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.follow_ups_processed, 1);
    let jobs = store.created_jobs().await;
    assert_eq!(jobs.len(), 1);

    let rule = jobs[0].segmentation.0.first_rule().unwrap().clone();
    assert_eq!(rule.kind, "custom");
    assert_eq!(rule.values.len(), 2);
    assert!(rule.values.contains(&failed_a.to_string()));
    assert!(rule.values.contains(&failed_b.to_string()));
    assert!(!rule.values.contains(&succeeded.to_string()));

    let row = store.follow_up(f_id).await.unwrap();
    assert_eq!(row.last_run_at, Some(base_time()));
    assert!(row.next_run_at.is_none());
}

#[tokio::test]
async fn follow_up_with_empty_target_still_counts_as_ran() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;

    // Base job has only successes, so on_fail matches nobody.
    let base_job = CampaignJobId::new();
    store
        .add_log(LoggedRecipient {
            job_id: base_job,
            recipient_id: ParticipantId::new(),
            status: DeliveryStatus::Success,
        })
        .await;

    let f = follow_up(ev.id, base_job, FollowUpTrigger::OnFail, Some(base_time()));
    let f_id = f.id;
    store.add_follow_up(f).await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.follow_ups_processed, 1);
    assert!(report.created_jobs.is_empty());
    assert!(store.created_jobs().await.is_empty());

    let row = store.follow_up(f_id).await.unwrap();
    assert!(row.last_run_at.is_some());
    assert!(row.next_run_at.is_none());
}

#[tokio::test]
async fn after_hours_follow_up_targets_every_logged_recipient() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;

    let base_job = CampaignJobId::new();
    for status in [DeliveryStatus::Failed, DeliveryStatus::Success, DeliveryStatus::Success] {
        store
            .add_log(LoggedRecipient {
                job_id: base_job,
                recipient_id: ParticipantId::new(),
                status,
            })
            .await;
    }

    store
        .add_follow_up(follow_up(ev.id, base_job, FollowUpTrigger::AfterHours, Some(base_time())))
        .await;

    let report = scheduler(store.clone()).run_sweep().await.unwrap();

    assert_eq!(report.follow_ups_processed, 1);
    let jobs = store.created_jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].segmentation.0.first_rule().unwrap().values.len(), 3);
}

#[tokio::test]
async fn due_counts_report_without_firing() {
    let store = Arc::new(MockSchedulerStore::new());
    let ev = event();
    store.add_event(ev.clone()).await;
    store.add_automation(automation(ev.id, Some(base_time()))).await;
    store.add_automation(automation(ev.id, Some(base_time() + Duration::hours(1)))).await;
    store
        .add_follow_up(follow_up(
            ev.id,
            CampaignJobId::new(),
            FollowUpTrigger::OnFail,
            Some(base_time()),
        ))
        .await;

    let (automations, follow_ups) = scheduler(store.clone()).due_counts().await.unwrap();

    assert_eq!(automations, 1);
    assert_eq!(follow_ups, 1);
    assert!(store.created_jobs().await.is_empty());
}
