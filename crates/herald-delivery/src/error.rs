//! Error types for campaign delivery.
//!
//! Only validation and storage failures are errors. Per-recipient send
//! outcomes are tagged values ([`crate::provider::SendOutcome`]) recorded
//! in delivery logs; an individual failed send never surfaces here.

use herald_core::models::{CampaignJobId, JobStatus};
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error conditions for running a campaign job.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The requested job id does not exist.
    #[error("campaign job {0} not found")]
    JobNotFound(CampaignJobId),

    /// The job exists but is not `pending`, so it cannot be claimed.
    #[error("campaign job {id} is {status}, not pending")]
    JobNotClaimable {
        /// The job that could not be claimed.
        id: CampaignJobId,
        /// Its current status.
        status: JobStatus,
    },

    /// The job references a template that does not exist.
    #[error("template not found for campaign job {0}")]
    TemplateNotFound(CampaignJobId),

    /// The job references an event that does not exist.
    #[error("event not found for campaign job {0}")]
    EventNotFound(CampaignJobId),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Store(String),

    /// Worker configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<herald_core::CoreError> for DeliveryError {
    fn from(err: herald_core::CoreError) -> Self {
        Self::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_claimable_names_the_blocking_status() {
        let id = CampaignJobId::new();
        let err = DeliveryError::JobNotClaimable { id, status: JobStatus::Completed };
        assert!(err.to_string().contains("completed"));
    }
}
