//! Raw SQL row shapes and their conversion into domain rows

use chrono::{DateTime, Utc};
use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::QueryableByName;

use crate::caps::{CapSet, ProviderPlacement, ScopeCaps};
use crate::deal_store::{CandidateRow, ProposalRow, ProviderStanding};
use crate::error::{EligibilityError, Result};
use crate::types::SourceRecord;

fn unsigned(column: &str, v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| {
        EligibilityError::Internal(format!("column {} holds negative value {}", column, v))
    })
}

fn unix_seconds(column: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
        EligibilityError::Internal(format!("column {} holds out-of-range time {}", column, secs))
    })
}

#[derive(Debug, QueryableByName)]
pub struct StandingSqlRow {
    #[diesel(sql_type = Bool)]
    pub registered: bool,
    #[diesel(sql_type = Nullable<Text>)]
    pub block_reason: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub outstanding_bytes: i64,
}

impl TryFrom<StandingSqlRow> for ProviderStanding {
    type Error = EligibilityError;

    fn try_from(r: StandingSqlRow) -> Result<Self> {
        Ok(ProviderStanding {
            registered: r.registered,
            block_reason: r.block_reason.filter(|s| !s.trim().is_empty()),
            outstanding_bytes: unsigned("outstanding_bytes", r.outstanding_bytes)?,
        })
    }
}

#[derive(Debug, QueryableByName)]
pub struct ScopeCapsSqlRow {
    #[diesel(sql_type = Text)]
    pub org_id: String,
    #[diesel(sql_type = Text)]
    pub city: String,
    #[diesel(sql_type = Text)]
    pub country: String,
    #[diesel(sql_type = Text)]
    pub continent: String,
    #[diesel(sql_type = BigInt)]
    pub max_per_org: i64,
    #[diesel(sql_type = BigInt)]
    pub max_per_city: i64,
    #[diesel(sql_type = BigInt)]
    pub max_per_country: i64,
    #[diesel(sql_type = BigInt)]
    pub max_per_continent: i64,
    #[diesel(sql_type = BigInt)]
    pub max_program_replicas: i64,
}

impl TryFrom<ScopeCapsSqlRow> for ScopeCaps {
    type Error = EligibilityError;

    fn try_from(r: ScopeCapsSqlRow) -> Result<Self> {
        Ok(ScopeCaps {
            caps: CapSet {
                per_org: unsigned("max_per_org", r.max_per_org)?,
                per_city: unsigned("max_per_city", r.max_per_city)?,
                per_country: unsigned("max_per_country", r.max_per_country)?,
                per_continent: unsigned("max_per_continent", r.max_per_continent)?,
                program_max: unsigned("max_program_replicas", r.max_program_replicas)?,
            },
            placement: ProviderPlacement {
                org_id: r.org_id,
                city: r.city,
                country: r.country,
                continent: r.continent,
            },
        })
    }
}

#[derive(Debug, QueryableByName)]
pub struct CandidateSqlRow {
    #[diesel(sql_type = Text)]
    pub dataset_slug: String,
    #[diesel(sql_type = BigInt)]
    pub padded_size: i64,
    #[diesel(sql_type = Text)]
    pub piece_cid: String,
    #[diesel(sql_type = BigInt)]
    pub deal_id: i64,
    #[diesel(sql_type = Text)]
    pub original_payload_cid: String,
    #[diesel(sql_type = Text)]
    pub normalized_payload_cid: String,
    #[diesel(sql_type = Text)]
    pub provider_id: String,
    #[diesel(sql_type = Bool)]
    pub is_filplus: bool,
    #[diesel(sql_type = BigInt)]
    pub end_time: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub counts_active: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub counts_pending: Option<String>,
}

impl TryFrom<CandidateSqlRow> for CandidateRow {
    type Error = EligibilityError;

    fn try_from(r: CandidateSqlRow) -> Result<Self> {
        Ok(CandidateRow {
            dataset: r.dataset_slug,
            padded_piece_size: unsigned("padded_size", r.padded_size)?,
            piece_cid: r.piece_cid,
            source: SourceRecord {
                provider_id: r.provider_id,
                deal_id: r.deal_id,
                original_payload_cid: r.original_payload_cid,
                normalized_payload_cid: r.normalized_payload_cid,
                is_filplus: r.is_filplus,
                deal_expiration: unix_seconds("end_time", r.end_time)?,
            },
            active_counts: r.counts_active,
            proposed_counts: r.counts_pending,
        })
    }
}

#[derive(Debug, QueryableByName)]
pub struct ProposalSqlRow {
    #[diesel(sql_type = Nullable<Text>)]
    pub proposal_success_cid: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub proposal_failstamp: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub failure: Option<String>,
    #[diesel(sql_type = BigInt)]
    pub start_by: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub start_epoch: Option<i64>,
    #[diesel(sql_type = Text)]
    pub piece_cid: String,
    #[diesel(sql_type = BigInt)]
    pub padded_size: i64,
    #[diesel(sql_type = Text)]
    pub payload_cid: String,
}

impl TryFrom<ProposalSqlRow> for ProposalRow {
    type Error = EligibilityError;

    fn try_from(r: ProposalSqlRow) -> Result<Self> {
        // failstamp is unix nanoseconds, zero while the proposal has not failed
        let failed_at = (r.proposal_failstamp > 0)
            .then(|| DateTime::<Utc>::from_timestamp_nanos(r.proposal_failstamp));

        Ok(ProposalRow {
            proposal_success_cid: r.proposal_success_cid,
            failed_at,
            failure: r.failure,
            start_by: unix_seconds("start_by", r.start_by)?,
            start_epoch: r.start_epoch.unwrap_or_default(),
            piece_cid: r.piece_cid,
            padded_piece_size: unsigned("padded_size", r.padded_size)?,
            root_cid: r.payload_cid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_failstamp_conversion() {
        let row = ProposalSqlRow {
            proposal_success_cid: None,
            proposal_failstamp: 1_700_000_000_000_000_000,
            failure: Some("timeout".into()),
            start_by: 1_700_100_000,
            start_epoch: None,
            piece_cid: "baga".into(),
            padded_size: 1 << 35,
            payload_cid: "bafy".into(),
        };
        let p = ProposalRow::try_from(row).unwrap();
        assert_eq!(p.failed_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(p.start_epoch, 0);
    }

    #[test]
    fn test_zero_failstamp_means_not_failed() {
        let row = ProposalSqlRow {
            proposal_success_cid: Some("bafyprop".into()),
            proposal_failstamp: 0,
            failure: None,
            start_by: 1_700_100_000,
            start_epoch: Some(3_500_000),
            piece_cid: "baga".into(),
            padded_size: 1 << 35,
            payload_cid: "bafy".into(),
        };
        assert!(ProposalRow::try_from(row).unwrap().failed_at.is_none());
    }

    #[test]
    fn test_negative_caps_rejected() {
        let row = ScopeCapsSqlRow {
            org_id: "o".into(),
            city: "c".into(),
            country: "C".into(),
            continent: "K".into(),
            max_per_org: -1,
            max_per_city: 1,
            max_per_country: 1,
            max_per_continent: 1,
            max_program_replicas: 1,
        };
        assert!(ScopeCaps::try_from(row).is_err());
    }
}
