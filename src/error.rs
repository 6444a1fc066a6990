//! Error types for deal-eligibility

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EligibilityError {
    /// Caller supplied something unusable (query parameter, header)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Verified identity headers were not attached to the request
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The same piece/provider combination showed up with two deal ids
    #[error("Unexpected double-deal for same sp/pcid {piece_cid}/{provider_id}: {first_deal_id} and {second_deal_id}")]
    DoubleDeal {
        piece_cid: String,
        provider_id: String,
        first_deal_id: i64,
        second_deal_id: i64,
    },

    #[error("Malformed replica counts for piece {piece_cid}: {reason}")]
    MalformedCounts { piece_cid: String, reason: String },

    #[error("Provider {0} has no placement record")]
    UnknownProvider(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::r2d2::PoolError> for EligibilityError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        EligibilityError::Pool(e.to_string())
    }
}

impl EligibilityError {
    /// True for failures that signal corrupt upstream data rather than a bad request
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            EligibilityError::DoubleDeal { .. } | EligibilityError::MalformedCounts { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EligibilityError>;
