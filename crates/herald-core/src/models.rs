//! Campaign pipeline domain models and strongly-typed identifiers.
//!
//! Defines campaign jobs, delivery logs, automation and follow-up
//! definitions, generic queue jobs, and the read-side collaborator rows
//! (events, templates, participants). Newtype ID wrappers and string-encoded
//! status enums carry their own database serialization so repositories stay
//! free of conversion noise.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::segment::SegmentationConfig;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Declares a UUID newtype identifier with database codec support.
///
/// Each generated type prevents accidental mixing of unrelated IDs at
/// compile time while encoding as a plain `uuid` column.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random identifier (UUID v4, no coordination).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <Uuid as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
                Ok(Self(uuid))
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// Declares an enum stored as lowercase snake_case text in the database.
macro_rules! db_enum {
    (
        $(#[$meta:meta])* $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $text)),+
                }
            }
        }

        impl sqlx::Type<PgDb> for $name {
            fn type_info() -> PgTypeInfo {
                <&str as sqlx::Type<PgDb>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, PgDb> for $name {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s).into()),
                }
            }
        }

        impl sqlx::Encode<'_, PgDb> for $name {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
                <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
            }
        }
    };
}

uuid_id! {
    /// Identifier of one bulk-send execution record.
    CampaignJobId
}

uuid_id! {
    /// Identifier of a hosted event (conference, gala, product launch).
    ///
    /// The event scopes participants, templates, and every campaign sent
    /// through the pipeline.
    EventId
}

uuid_id! {
    /// Identifier of a message template.
    TemplateId
}

uuid_id! {
    /// Identifier of a registered or invited participant.
    ParticipantId
}

uuid_id! {
    /// Identifier of an automation definition.
    AutomationId
}

uuid_id! {
    /// Identifier of a follow-up definition.
    FollowUpId
}

uuid_id! {
    /// Identifier of a generic background queue job.
    QueueJobId
}

db_enum! {
    /// Delivery channel for a campaign.
    Channel {
        /// Transactional email.
        Email => "email",
        /// SMS gateway.
        Sms => "sms",
        /// Chat-bot business messaging.
        Chat => "chat",
    }
}

impl Channel {
    /// True for channels delivered through the message gateway (sms/chat)
    /// rather than email. Message channels require inter-recipient rate
    /// limiting.
    pub fn is_message(self) -> bool {
        matches!(self, Self::Sms | Self::Chat)
    }
}

db_enum! {
    /// Campaign job lifecycle status.
    ///
    /// The delivery worker only ever walks pending -> processing ->
    /// {completed, failed}. The two remaining variants are administrative
    /// markers set directly by the console and never produced or read by
    /// the worker once a run has started.
    JobStatus {
        /// Created, waiting for a worker invocation.
        Pending => "pending",
        /// Claimed by a worker; recipients are being sent.
        Processing => "processing",
        /// Terminal: at least one recipient succeeded (or segment was empty).
        Completed => "completed",
        /// Terminal: every recipient failed, a validation error occurred, or
        /// the circuit breaker tripped.
        Failed => "failed",
        /// Terminal: marked failed by an operator.
        FailedManual => "failed_manual",
        /// Terminal: stopped by an operator before being claimed.
        Stopped => "stopped",
    }
}

impl JobStatus {
    /// True once a job can no longer change state through the worker.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

db_enum! {
    /// Outcome of one send attempt to one recipient.
    DeliveryStatus {
        /// Provider accepted the message.
        Success => "success",
        /// Provider rejected the message or the recipient had no address.
        Failed => "failed",
    }
}

db_enum! {
    /// How an automation decides when to fire.
    AutomationKind {
        /// Fires when a computed point in time is reached.
        TimeBased => "time_based",
        /// Armed by an external trigger (e.g. registration completed).
        EventBased => "event_based",
    }
}

db_enum! {
    /// Time anchor for time-based automations.
    TimeType {
        /// A fixed `send_at` timestamp.
        Absolute => "absolute",
        /// An offset in days from the event start.
        Relative => "relative",
    }
}

db_enum! {
    /// What a follow-up reacts to on its base job.
    FollowUpTrigger {
        /// Recipients whose delivery log for the base job is `failed`.
        OnFail => "on_fail",
        /// Recipients whose delivery log for the base job is `success`.
        OnSuccess => "on_success",
        /// Every logged recipient of the base job, `delay_hours` after it ran.
        AfterHours => "after_hours",
    }
}

db_enum! {
    /// Generic queue job lifecycle status.
    QueueStatus {
        /// Waiting to be claimed.
        Queued => "queued",
        /// Claimed by a runner.
        Processing => "processing",
        /// Terminal success.
        Done => "done",
        /// Terminal failure after exhausting retries.
        Failed => "failed",
    }
}

db_enum! {
    /// Registration state of a participant.
    ParticipantStatus {
        /// Invited but not yet registered.
        Invited => "invited",
        /// Completed registration.
        Registered => "registered",
        /// Checked in on site.
        CheckedIn => "checked_in",
    }
}

impl ParticipantStatus {
    /// True once registration has been completed (checked-in implies
    /// registered).
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::CheckedIn)
    }
}

/// One bulk-send execution: "send template T to segment S on channel C".
///
/// Created by a direct API call or by the scheduler, mutated only by the
/// delivery worker, never deleted (audit trail).
///
/// # Counter invariant
///
/// `processed_count == success_count + fail_count` and `processed_count <=
/// total_count` hold at every persisted checkpoint, including terminal
/// state.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignJob {
    /// Unique identifier for this job.
    pub id: CampaignJobId,

    /// Event whose participants are targeted.
    pub event_id: EventId,

    /// Template rendered per recipient.
    pub template_id: TemplateId,

    /// Delivery channel.
    pub channel: Channel,

    /// Declarative targeting rule set.
    pub segmentation: sqlx::types::Json<SegmentationConfig>,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Number of resolved recipients, set once at run start.
    pub total_count: i32,

    /// Recipients attempted so far.
    pub processed_count: i32,

    /// Recipients whose send succeeded.
    pub success_count: i32,

    /// Recipients whose send failed.
    pub fail_count: i32,

    /// When the job row was created.
    pub created_at: DateTime<Utc>,

    /// When the job row was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl CampaignJob {
    /// Creates a new pending job with zeroed counters.
    pub fn new(
        event_id: EventId,
        template_id: TemplateId,
        channel: Channel,
        segmentation: SegmentationConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CampaignJobId::new(),
            event_id,
            template_id,
            channel,
            segmentation: sqlx::types::Json(segmentation),
            status: JobStatus::Pending,
            total_count: 0,
            processed_count: 0,
            success_count: 0,
            fail_count: 0,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Append-only record of one send attempt within a campaign job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLog {
    /// Unique identifier for this log row.
    pub id: Uuid,

    /// Owning campaign job.
    pub job_id: CampaignJobId,

    /// Participant the message was addressed to.
    pub recipient_id: ParticipantId,

    /// Email address or phone number used.
    pub address: String,

    /// Send outcome.
    pub status: DeliveryStatus,

    /// Provider error for failed sends.
    pub error_message: Option<String>,

    /// When the provider accepted the message. Null on failure.
    pub sent_at: Option<DateTime<Utc>>,
}

/// A time- or trigger-armed definition that spawns campaign jobs.
///
/// Authored by the console, mutated only by the scheduler (`last_run_at`,
/// `next_run_at`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Automation {
    /// Unique identifier.
    pub id: AutomationId,

    /// Event this automation belongs to.
    pub event_id: EventId,

    /// Template for the spawned jobs.
    pub template_id: TemplateId,

    /// Channel for the spawned jobs.
    pub channel: Channel,

    /// Time-based or event-based.
    pub kind: AutomationKind,

    /// Time anchor; only meaningful for time-based automations.
    pub time_type: Option<TimeType>,

    /// Fixed fire time for absolute automations.
    pub send_at: Option<DateTime<Utc>>,

    /// Offset in days from event start for relative automations.
    pub offset_days: Option<i32>,

    /// External trigger name for event-based automations.
    pub trigger_kind: Option<String>,

    /// Targeting rules applied to the spawned jobs.
    pub segmentation: sqlx::types::Json<SegmentationConfig>,

    /// Inactive automations are skipped by the sweep.
    pub is_active: bool,

    /// When the automation last fired.
    pub last_run_at: Option<DateTime<Utc>>,

    /// When the automation is next due. Null means never.
    pub next_run_at: Option<DateTime<Utc>>,
}

/// A definition reacting to the outcome of a prior campaign job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowUp {
    /// Unique identifier.
    pub id: FollowUpId,

    /// Event this follow-up belongs to.
    pub event_id: EventId,

    /// Template for the spawned job.
    pub template_id: TemplateId,

    /// Channel for the spawned job.
    pub channel: Channel,

    /// The campaign job whose outcome this follow-up reacts to.
    pub base_job_id: CampaignJobId,

    /// Which recipients of the base job are targeted.
    pub trigger_type: FollowUpTrigger,

    /// Delay after the base job, used only by `after_hours`.
    pub delay_hours: Option<i32>,

    /// Targeting rules; replaced by a custom rule at fire time.
    pub segmentation: sqlx::types::Json<SegmentationConfig>,

    /// Inactive follow-ups are skipped by the sweep.
    pub is_active: bool,

    /// When the follow-up last fired.
    pub last_run_at: Option<DateTime<Utc>>,

    /// When the follow-up is next due. Null means never.
    pub next_run_at: Option<DateTime<Utc>>,
}

/// A coarse-grained background task with idempotent enqueue semantics.
///
/// Standalone entity with no relationship to the campaign model; tasks that
/// need per-recipient logging belong in `CampaignJob` instead.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueJob {
    /// Unique identifier.
    pub id: QueueJobId,

    /// Opaque handler selector.
    pub job_type: String,

    /// Opaque structured payload passed to the handler.
    pub payload: sqlx::types::Json<serde_json::Value>,

    /// Current lifecycle status.
    pub status: QueueStatus,

    /// Caller-supplied dedup token; unique while the job is in flight.
    pub idempotency_key: Option<String>,

    /// Failed attempts so far.
    pub retry_count: i32,

    /// Maximum failed attempts before terminal failure.
    pub max_retries: i32,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the job row was last mutated.
    pub updated_at: DateTime<Utc>,

    /// When the job was first claimed.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Last handler error or timeout message.
    pub error_message: Option<String>,
}

impl QueueJob {
    /// Creates a new queued job.
    pub fn new(
        job_type: impl Into<String>,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
        max_retries: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueueJobId::new(),
            job_type: job_type.into(),
            payload: sqlx::types::Json(payload),
            status: QueueStatus::Queued,
            idempotency_key,
            retry_count: 0,
            max_retries,
            created_at,
            updated_at: created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// Read-side event row owned by the console CRUD screens.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,

    /// Short code used in deep links.
    pub code: String,

    /// Display name.
    pub name: String,

    /// When the event starts; anchor for relative automations.
    pub starts_at: DateTime<Utc>,

    /// When the event ends.
    pub ends_at: DateTime<Utc>,
}

/// Read-side message template row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    /// Unique identifier.
    pub id: TemplateId,

    /// Event this template belongs to.
    pub event_id: EventId,

    /// Channel the template is authored for.
    pub channel: Channel,

    /// Subject line; merged with the same tokens as the body.
    pub subject: String,

    /// HTML body.
    pub html_body: String,

    /// Optional plain-text body; message channels prefer it.
    pub text_body: Option<String>,
}

/// Read-side participant row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Participant {
    /// Unique identifier.
    pub id: ParticipantId,

    /// Event the participant belongs to.
    pub event_id: EventId,

    /// Display name.
    pub name: String,

    /// Email address, if collected.
    pub email: Option<String>,

    /// Phone number, if collected. Used for both sms and chat channels.
    pub phone: Option<String>,

    /// Company affiliation.
    pub company: Option<String>,

    /// Preferred language code.
    pub language: Option<String>,

    /// VIP flag set by the organizers.
    pub is_vip: bool,

    /// Registration state.
    pub status: ParticipantStatus,
}

impl Participant {
    /// The address used for the given channel, if the participant has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms | Channel::Chat => self.phone.as_deref(),
        }
    }
}
