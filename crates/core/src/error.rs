use thiserror::Error;
use uuid::Uuid;

pub type DripResult<T> = Result<T, DripError>;

#[derive(Error, Debug)]
pub enum DripError {
    #[error("Campaign {0} not found for tenant {1}")]
    CampaignNotFound(Uuid, Uuid),

    #[error("Campaign {0} is not active")]
    CampaignInactive(Uuid),

    #[error("Membership {0} not found")]
    MembershipNotFound(Uuid),

    #[error("Duplicate enrollment: {email} is already in campaign {campaign_id}")]
    DuplicateEnrollment { campaign_id: Uuid, email: String },

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Dispatch timed out after {0}ms")]
    DispatchTimeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
