//! Core domain types for the campaign delivery pipeline.
//!
//! Provides strongly-typed identifiers, the campaign/automation/queue data
//! model, segmentation resolution, template rendering, and the Postgres
//! repository layer. Every other crate in the workspace builds on these
//! foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod render;
pub mod segment;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    Automation, AutomationId, AutomationKind, CampaignJob, CampaignJobId, Channel, DeliveryLog,
    DeliveryStatus, Event, EventId, FollowUp, FollowUpId, FollowUpTrigger, JobStatus, Participant,
    ParticipantId, ParticipantStatus, QueueJob, QueueJobId, QueueStatus, Template, TemplateId,
    TimeType,
};
pub use segment::{SegmentRule, SegmentationConfig};
pub use time::{Clock, RealClock, TestClock};
