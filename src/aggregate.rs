//! Candidate aggregation
//!
//! Folds (piece, source) rows into [`Piece`] groups for a single request.
//! The aggregator owns the request's working sets: the piece map, the
//! (piece, provider) -> deal id map used to catch double deals, and the set
//! of pieces already ruled out by the quota check. All of it is dropped with
//! the aggregator.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::commands::CommandTemplate;
use crate::counts::decode_replica_counts;
use crate::deal_store::CandidateRow;
use crate::error::{EligibilityError, Result};
use crate::quota::{QuotaFilter, QuotaVerdict};
use crate::types::{Piece, ProviderId, Source};

/// What happened to one ingested row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Attached,
    /// Same deal seen again for the same piece and provider
    Repeated,
    Oversized,
    /// Piece was already ruled out earlier in this request
    AlreadyIneligible,
    /// Piece failed the quota check on first sighting
    OverQuota,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub rows: usize,
    pub attached: usize,
    pub repeated: usize,
    pub oversized: usize,
    pub over_quota: usize,
    pub ineligible_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PieceProvider {
    piece_cid: String,
    provider_id: String,
}

pub struct CandidateAggregator<'a> {
    caller: &'a ProviderId,
    capacity: u64,
    quota: Option<&'a QuotaFilter>,
    commands: &'a CommandTemplate,
    pieces: HashMap<String, Piece>,
    seen: HashMap<PieceProvider, i64>,
    ineligible: HashSet<String>,
    stats: AggregateStats,
}

impl<'a> CandidateAggregator<'a> {
    /// `quota` is `None` on listings that carry no replica counts
    pub fn new(
        caller: &'a ProviderId,
        capacity: u64,
        quota: Option<&'a QuotaFilter>,
        commands: &'a CommandTemplate,
    ) -> Self {
        Self {
            caller,
            capacity,
            quota,
            commands,
            pieces: HashMap::with_capacity(1024),
            seen: HashMap::with_capacity(4096),
            ineligible: HashSet::new(),
            stats: AggregateStats::default(),
        }
    }

    pub fn ingest_all<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = CandidateRow>,
    {
        for row in rows {
            self.ingest(row)?;
        }
        Ok(())
    }

    pub fn ingest(&mut self, row: CandidateRow) -> Result<RowOutcome> {
        self.stats.rows += 1;

        let key = PieceProvider {
            piece_cid: row.piece_cid.clone(),
            provider_id: row.source.provider_id.clone(),
        };
        if let Some(&first_deal_id) = self.seen.get(&key) {
            if first_deal_id != row.source.deal_id {
                return Err(EligibilityError::DoubleDeal {
                    piece_cid: key.piece_cid,
                    provider_id: key.provider_id,
                    first_deal_id,
                    second_deal_id: row.source.deal_id,
                });
            }
            self.stats.repeated += 1;
            return Ok(RowOutcome::Repeated);
        }
        self.seen.insert(key, row.source.deal_id);

        if row.padded_piece_size > self.capacity {
            self.stats.oversized += 1;
            return Ok(RowOutcome::Oversized);
        }
        if self.ineligible.contains(&row.piece_cid) {
            self.stats.ineligible_skipped += 1;
            return Ok(RowOutcome::AlreadyIneligible);
        }

        if !self.pieces.contains_key(&row.piece_cid) {
            let counts = decode_replica_counts(
                &row.piece_cid,
                row.active_counts.as_deref(),
                row.proposed_counts.as_deref(),
            )?;

            if let (Some(counts), Some(quota)) = (counts, self.quota) {
                if let QuotaVerdict::Breach { scope, value, count, cap } = quota.evaluate(&counts) {
                    debug!(
                        piece_cid = %row.piece_cid,
                        scope = %scope,
                        value = %value,
                        count,
                        cap,
                        "Piece over replica quota"
                    );
                    self.ineligible.insert(row.piece_cid);
                    self.stats.over_quota += 1;
                    return Ok(RowOutcome::OverQuota);
                }
            }

            let cmd = self.commands.request_piece(self.caller, &row.piece_cid);
            self.pieces.insert(
                row.piece_cid.clone(),
                Piece::new(row.piece_cid.clone(), row.dataset, row.padded_piece_size, cmd),
            );
        }

        let source = Source::new(&row.piece_cid, row.source);
        if let Some(piece) = self.pieces.get_mut(&row.piece_cid) {
            piece.push_source(source);
        }
        self.stats.attached += 1;
        Ok(RowOutcome::Attached)
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    /// Pieces collected so far, in no particular order
    pub fn into_pieces(self) -> Vec<Piece> {
        self.pieces.into_values().collect()
    }
}
