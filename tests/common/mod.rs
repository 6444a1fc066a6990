//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use deal_eligibility::caps::{CapSet, ProviderPlacement, ScopeCaps};
use deal_eligibility::types::SourceRecord;
use deal_eligibility::{
    CandidateQuery, CandidateRow, Config, DealStore, ListingScope, ProposalRow, ProviderId,
    ProviderStanding, Result,
};

pub const API_BASE: &str = "https://api.test";
pub const GIB: u64 = 1 << 30;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn config() -> Config {
    Config {
        api_base_url: API_BASE.to_string(),
        ..Config::default()
    }
}

pub fn provider(id: &str) -> ProviderId {
    id.parse().unwrap()
}

pub fn eligible_standing() -> ProviderStanding {
    ProviderStanding {
        registered: true,
        block_reason: None,
        outstanding_bytes: 0,
    }
}

pub fn caps(org: &str, per_org: u64) -> ScopeCaps {
    ScopeCaps {
        placement: ProviderPlacement {
            org_id: org.into(),
            city: "Berlin".into(),
            country: "DE".into(),
            continent: "EU".into(),
        },
        caps: CapSet {
            per_org,
            per_city: 10,
            per_country: 10,
            per_continent: 10,
            program_max: 10,
        },
    }
}

pub fn row(piece: &str, source_provider: &str, deal_id: i64) -> CandidateRow {
    CandidateRow {
        dataset: "dataset-a".into(),
        padded_piece_size: 32 * GIB,
        piece_cid: piece.into(),
        source: SourceRecord {
            provider_id: source_provider.into(),
            deal_id,
            original_payload_cid: format!("bafyorig-{}", piece),
            normalized_payload_cid: format!("bafynorm-{}", piece),
            is_filplus: true,
            deal_expiration: now() + chrono::Duration::days(10),
        },
        active_counts: None,
        proposed_counts: None,
    }
}

pub fn counted(mut r: CandidateRow, active: &str, proposed: &str) -> CandidateRow {
    r.active_counts = Some(active.into());
    r.proposed_counts = Some(proposed.into());
    r
}

/// Fixed-answer store that records which calls were made
#[derive(Default)]
pub struct MockStore {
    pub standing: ProviderStanding,
    pub caps: Option<ScopeCaps>,
    pub rows: Vec<CandidateRow>,
    pub proposals: Vec<ProposalRow>,
    pub candidate_calls: Mutex<Vec<(ListingScope, u64)>>,
}

impl MockStore {
    pub fn eligible(rows: Vec<CandidateRow>) -> Self {
        Self {
            standing: eligible_standing(),
            caps: Some(caps("org-a", 2)),
            rows,
            ..Default::default()
        }
    }

    pub fn candidate_calls(&self) -> usize {
        self.candidate_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DealStore for MockStore {
    async fn provider_standing(&self, _provider: &ProviderId) -> Result<ProviderStanding> {
        Ok(self.standing.clone())
    }

    async fn scope_caps(&self, _provider: &ProviderId) -> Result<Option<ScopeCaps>> {
        Ok(self.caps.clone())
    }

    async fn candidates(&self, query: CandidateQuery<'_>) -> Result<Vec<CandidateRow>> {
        self.candidate_calls
            .lock()
            .unwrap()
            .push((query.scope, query.capacity));
        Ok(self.rows.clone())
    }

    async fn open_proposals(
        &self,
        _provider: &ProviderId,
        _now: DateTime<Utc>,
    ) -> Result<Vec<ProposalRow>> {
        Ok(self.proposals.clone())
    }
}
