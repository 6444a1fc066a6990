//! Read-only view of the dealer's data source
//!
//! Everything the eligibility engine needs from outside arrives through
//! [`DealStore`]. The production implementation is [`crate::db::SqlDealStore`];
//! tests plug in fixed rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::caps::ScopeCaps;
use crate::error::Result;
use crate::types::{ProviderId, SourceRecord};

/// Which candidate listing is being served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingScope {
    /// Pieces the provider itself still holds, nearing expiry
    SpLocal,
    /// Pieces available from any provider, subject to scope caps
    Anywhere,
}

impl ListingScope {
    pub fn path(&self) -> &'static str {
        match self {
            ListingScope::SpLocal => "/eligible_pieces/sp_local",
            ListingScope::Anywhere => "/eligible_pieces/anywhere",
        }
    }
}

/// One (piece, source) pairing from the eligible deal list
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub dataset: String,
    pub padded_piece_size: u64,
    pub piece_cid: String,
    pub source: SourceRecord,
    /// Serialized active replica counts (anywhere listing only)
    pub active_counts: Option<String>,
    /// Serialized proposed replica counts (anywhere listing only)
    pub proposed_counts: Option<String>,
}

/// Parameters of a candidate query
#[derive(Debug, Clone)]
pub struct CandidateQuery<'a> {
    pub scope: ListingScope,
    pub provider: &'a ProviderId,
    pub capacity: u64,
    /// Local listing only offers deals ending before this instant
    pub expiration_cutoff: DateTime<Utc>,
}

/// What the store knows about a provider's standing in the program
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderStanding {
    pub registered: bool,
    pub block_reason: Option<String>,
    /// Padded bytes of proposals neither failed nor activated yet
    pub outstanding_bytes: u64,
}

/// A proposal row as read for the pending-proposals report
#[derive(Debug, Clone)]
pub struct ProposalRow {
    pub proposal_success_cid: Option<String>,
    /// Failure time; `None` when the proposal has not failed
    pub failed_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
    pub start_by: DateTime<Utc>,
    pub start_epoch: i64,
    pub piece_cid: String,
    pub padded_piece_size: u64,
    pub root_cid: String,
}

#[async_trait]
pub trait DealStore: Send + Sync {
    async fn provider_standing(&self, provider: &ProviderId) -> Result<ProviderStanding>;

    /// Placement and caps; `None` when the provider has no placement record
    async fn scope_caps(&self, provider: &ProviderId) -> Result<Option<ScopeCaps>>;

    async fn candidates(&self, query: CandidateQuery<'_>) -> Result<Vec<CandidateRow>>;

    /// Open proposals: start-by more than an hour after `now`, not activated
    async fn open_proposals(
        &self,
        provider: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProposalRow>>;

    /// Pool/connection health, reported by the health endpoint
    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub connections: u32,
    pub idle_connections: u32,
}
