//! [`DealStore`] over the pooled SQL connection
//!
//! Every call checks one connection out of the pool on tokio's blocking
//! pool; the connection returns to the pool when the closure finishes,
//! whether the query succeeded or not.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use tracing::debug;

use super::rows::{CandidateSqlRow, ProposalSqlRow, ScopeCapsSqlRow, StandingSqlRow};
use super::DbPool;
use crate::caps::ScopeCaps;
use crate::deal_store::{
    CandidateQuery, CandidateRow, DealStore, ListingScope, ProposalRow, ProviderStanding,
    StoreStats,
};
use crate::error::{EligibilityError, Result};
use crate::types::ProviderId;

const STANDING_SQL: &str = r#"
    SELECT
        EXISTS ( SELECT 1 FROM providers WHERE provider_id = ?1 ) AS registered,
        (
            SELECT reason
                FROM provider_ineligibility
            WHERE provider_id = ?1
            ORDER BY reason
            LIMIT 1
        ) AS block_reason,
        COALESCE(
            (
                SELECT SUM( p.padded_size )
                    FROM proposals pr
                    JOIN pieces p USING ( piece_cid )
                WHERE
                    pr.provider_id = ?1
                        AND
                    pr.proposal_failstamp = 0
                        AND
                    pr.activated_deal_id IS NULL
            ),
            0
        ) AS outstanding_bytes
"#;

const SCOPE_CAPS_SQL: &str = r#"
    SELECT
            p.org_id,
            p.city,
            p.country,
            p.continent,
            c.max_per_org,
            c.max_per_city,
            c.max_per_country,
            c.max_per_continent,
            c.max_program_replicas
        FROM providers p
        CROSS JOIN program_caps c
    WHERE p.provider_id = ?1
    LIMIT 1
"#;

/// Pieces still held by the provider itself, expiring before the cutoff,
/// limited to those whose org still has room below the per-org cap.
const SP_LOCAL_SQL: &str = r#"
    WITH
        providers_in_org AS (
            SELECT provider_id FROM providers WHERE org_id IN ( SELECT org_id FROM providers WHERE provider_id = ?1 )
        )
    SELECT
            d.dataset_slug,
            d.padded_size,
            d.piece_cid,
            d.deal_id,
            d.original_payload_cid,
            d.normalized_payload_cid,
            d.provider_id,
            d.is_filplus,
            d.end_time,
            NULL AS counts_active,
            NULL AS counts_pending
        FROM deallist_eligible d
    WHERE
        d.provider_id = ?1
            AND
        d.end_time < ?2
            AND
        ( SELECT max_per_org FROM program_caps LIMIT 1 ) > (
            (
                SELECT COUNT(*)
                    FROM published_deals pd
                    JOIN clients c USING ( client_id )
                    JOIN providers_in_org USING ( provider_id )
                WHERE
                    pd.piece_cid = d.piece_cid
                        AND
                    c.is_affiliated
                        AND
                    pd.status = 'active'
                        AND
                    NOT COALESCE( json_extract( pd.meta, '$.inactive' ), 0 )
                        AND
                    pd.end_time > ?2
            )
                +
            (
                SELECT COUNT(*)
                    FROM proposals pr
                    JOIN providers_in_org USING ( provider_id )
                WHERE
                    pr.piece_cid = d.piece_cid
                        AND
                    pr.proposal_failstamp = 0
                        AND
                    pr.activated_deal_id IS NULL
            )
        )
"#;

/// Pieces available anywhere, excluding ones the provider already holds or
/// has in flight.
const ANYWHERE_SQL: &str = r#"
    SELECT
            d.dataset_slug,
            d.padded_size,
            d.piece_cid,
            d.deal_id,
            d.original_payload_cid,
            d.normalized_payload_cid,
            d.provider_id,
            d.is_filplus,
            d.end_time,
            rc.active AS counts_active,
            rc.pending AS counts_pending
        FROM deallist_eligible d
        JOIN replica_counts rc USING ( piece_cid )
    WHERE
        d.padded_size <= ?2
            AND
        NOT EXISTS (
            SELECT 42
                FROM proposals pr
            WHERE
                pr.piece_cid = d.piece_cid
                    AND
                pr.proposal_failstamp = 0
                    AND
                pr.activated_deal_id IS NULL
                    AND
                pr.provider_id = ?1
        )
            AND
        NOT EXISTS (
            SELECT 42
                FROM published_deals pd
            WHERE
                pd.piece_cid = d.piece_cid
                    AND
                pd.status != 'terminated'
                    AND
                NOT COALESCE( json_extract( pd.meta, '$.inactive' ), 0 )
                    AND
                pd.provider_id = ?1
        )
"#;

const OPEN_PROPOSALS_SQL: &str = r#"
    SELECT
            pr.proposal_success_cid,
            pr.proposal_failstamp,
            json_extract( pr.meta, '$.failure' ) AS failure,
            pr.start_by,
            json_extract( pr.dealstart_payload, '$.DealStartEpoch' ) AS start_epoch,
            p.piece_cid,
            p.padded_size,
            pl.payload_cid
        FROM proposals pr
        JOIN pieces p USING ( piece_cid )
        JOIN payloads pl USING ( piece_cid )
    WHERE
        pr.provider_id = ?1
            AND
        pr.start_by > ?2
            AND
        pr.activated_deal_id IS NULL
"#;

/// Read-only deal store backed by the SQL pool
#[derive(Clone)]
pub struct SqlDealStore {
    pool: DbPool,
}

impl SqlDealStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run `f` with a pooled connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| EligibilityError::Internal(format!("query task failed: {}", e)))?
    }
}

#[async_trait]
impl DealStore for SqlDealStore {
    async fn provider_standing(&self, provider: &ProviderId) -> Result<ProviderStanding> {
        let provider = provider.to_string();
        self.with_conn(move |conn| {
            let row: StandingSqlRow = diesel::sql_query(STANDING_SQL)
                .bind::<Text, _>(&provider)
                .get_result(conn)?;
            ProviderStanding::try_from(row)
        })
        .await
    }

    async fn scope_caps(&self, provider: &ProviderId) -> Result<Option<ScopeCaps>> {
        let provider = provider.to_string();
        self.with_conn(move |conn| {
            let row: Option<ScopeCapsSqlRow> = diesel::sql_query(SCOPE_CAPS_SQL)
                .bind::<Text, _>(&provider)
                .get_result(conn)
                .optional()?;
            row.map(ScopeCaps::try_from).transpose()
        })
        .await
    }

    async fn candidates(&self, query: CandidateQuery<'_>) -> Result<Vec<CandidateRow>> {
        let provider = query.provider.to_string();
        let scope = query.scope;
        let capacity = i64::try_from(query.capacity).unwrap_or(i64::MAX);
        let cutoff = query.expiration_cutoff.timestamp();

        let rows: Vec<CandidateSqlRow> = self
            .with_conn(move |conn| {
                let rows: Vec<CandidateSqlRow> = match scope {
                    ListingScope::SpLocal => diesel::sql_query(SP_LOCAL_SQL)
                        .bind::<Text, _>(&provider)
                        .bind::<BigInt, _>(cutoff)
                        .load(conn)?,
                    ListingScope::Anywhere => diesel::sql_query(ANYWHERE_SQL)
                        .bind::<Text, _>(&provider)
                        .bind::<BigInt, _>(capacity)
                        .load(conn)?,
                };
                Ok(rows)
            })
            .await?;

        debug!(
            provider = %query.provider,
            listing = scope.path(),
            rows = rows.len(),
            "Loaded candidate rows"
        );
        rows.into_iter().map(CandidateRow::try_from).collect()
    }

    async fn open_proposals(
        &self,
        provider: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProposalRow>> {
        let provider = provider.to_string();
        let start_by_floor = (now + Duration::hours(1)).timestamp();

        let rows: Vec<ProposalSqlRow> = self
            .with_conn(move |conn| {
                Ok(diesel::sql_query(OPEN_PROPOSALS_SQL)
                    .bind::<Text, _>(&provider)
                    .bind::<BigInt, _>(start_by_floor)
                    .load(conn)?)
            })
            .await?;

        rows.into_iter().map(ProposalRow::try_from).collect()
    }

    fn stats(&self) -> StoreStats {
        let state = self.pool.state();
        StoreStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }
}
