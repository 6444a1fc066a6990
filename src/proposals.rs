//! Pending-proposal report
//!
//! Classifies a provider's open proposals:
//! - failed more than 24h ago: dropped
//! - failed within 24h: reported as a recent failure, most recent first
//! - no proposal document yet: only counted as pending
//! - proposal document present: listed with an import command and the
//!   whole hours left before the deal must start

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::commands;
use crate::deal_store::ProposalRow;
use crate::types::ProviderId;

/// Failures older than this are no longer reported
pub fn failure_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalFailure {
    #[serde(rename = "timestamp")]
    pub failed_at: DateTime<Utc>,
    pub error: String,
    pub piece_cid: String,
    pub root_cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealProposal {
    pub deal_proposal_cid: String,
    pub hours_remaining: i64,
    pub piece_size: u64,
    pub piece_cid: String,
    pub root_cid: String,
    pub deal_start_time: DateTime<Utc>,
    pub deal_start_epoch: i64,
    pub sample_import_cmd: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProposalReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_failures: Vec<ProposalFailure>,
    pub pending_proposals: Vec<DealProposal>,
    /// Proposals accepted for sending but without a proposal document yet
    #[serde(skip)]
    pub unsent_count: usize,
}

impl ProposalReport {
    /// Human readable overview for the info lines
    pub fn summary(&self, provider: &ProviderId) -> String {
        let mut msg = [
            format!("This is an overview of deals recently proposed to SP {}", provider),
            format!(
                "There currently are {} proposals to send out, and {} successful proposals awaiting sealing.",
                self.unsent_count,
                self.pending_proposals.len()
            ),
        ]
        .join("\n");

        if !self.recent_failures.is_empty() {
            msg.push_str(&format!(
                "\n\nIn the past 24h there were {} proposal errors, shown below.",
                self.recent_failures.len()
            ));
        }
        msg
    }
}

/// Whole hours from `now` until `deadline`, truncated toward zero
pub fn hours_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_hours()
}

/// Build the report from a provider's open proposal rows
pub fn classify<I>(rows: I, now: DateTime<Utc>) -> ProposalReport
where
    I: IntoIterator<Item = ProposalRow>,
{
    let mut report = ProposalReport::default();
    // several joined rows may describe one failure event
    let mut failures: BTreeMap<(DateTime<Utc>, String), ProposalFailure> = BTreeMap::new();

    for row in rows {
        if let Some(failed_at) = row.failed_at {
            if now - failed_at < failure_window() {
                failures
                    .entry((failed_at, row.piece_cid.clone()))
                    .or_insert_with(|| ProposalFailure {
                        failed_at,
                        error: row.failure.unwrap_or_default(),
                        piece_cid: row.piece_cid,
                        root_cid: row.root_cid,
                    });
            }
            continue;
        }

        match row.proposal_success_cid {
            None => report.unsent_count += 1,
            Some(proposal_cid) => {
                report.pending_proposals.push(DealProposal {
                    sample_import_cmd: commands::import_data(
                        &proposal_cid,
                        &row.piece_cid,
                        &row.root_cid,
                    ),
                    deal_proposal_cid: proposal_cid,
                    hours_remaining: hours_until(row.start_by, now),
                    piece_size: row.padded_piece_size,
                    piece_cid: row.piece_cid,
                    root_cid: row.root_cid,
                    deal_start_time: row.start_by,
                    deal_start_epoch: row.start_epoch,
                });
            }
        }
    }

    report.pending_proposals.sort_by(|a, b| {
        let key_a = (a.piece_size, a.hours_remaining, &a.piece_cid);
        let key_b = (b.piece_size, b.hours_remaining, &b.piece_cid);
        key_a.cmp(&key_b)
    });

    report.recent_failures = failures.into_values().collect();
    report.recent_failures.sort_by(|a, b| {
        let key_a = (Reverse(a.failed_at), &a.piece_cid);
        let key_b = (Reverse(b.failed_at), &b.piece_cid);
        key_a.cmp(&key_b)
    });

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn row(piece: &str, size: u64) -> ProposalRow {
        ProposalRow {
            proposal_success_cid: None,
            failed_at: None,
            failure: None,
            start_by: now() + Duration::hours(72),
            start_epoch: 4_000_000,
            piece_cid: piece.into(),
            padded_piece_size: size,
            root_cid: format!("bafyroot-{}", piece),
        }
    }

    fn failed(piece: &str, ago: Duration, msg: &str) -> ProposalRow {
        ProposalRow {
            failed_at: Some(now() - ago),
            failure: Some(msg.into()),
            ..row(piece, 1 << 35)
        }
    }

    fn proposed(piece: &str, size: u64, start_in: Duration) -> ProposalRow {
        ProposalRow {
            proposal_success_cid: Some(format!("bafyprop-{}", piece)),
            start_by: now() + start_in,
            ..row(piece, size)
        }
    }

    #[test]
    fn test_stale_failures_dropped() {
        let report = classify(vec![failed("P1", Duration::hours(25), "boom")], now());
        assert!(report.recent_failures.is_empty());
        assert!(report.pending_proposals.is_empty());
        assert_eq!(report.unsent_count, 0);
    }

    #[test]
    fn test_failure_exactly_24h_old_dropped() {
        let report = classify(vec![failed("P1", Duration::hours(24), "boom")], now());
        assert!(report.recent_failures.is_empty());
    }

    #[test]
    fn test_recent_failures_most_recent_first() {
        let report = classify(
            vec![
                failed("P1", Duration::hours(23), "older"),
                failed("P2", Duration::hours(1), "newer"),
            ],
            now(),
        );
        let errors: Vec<&str> = report.recent_failures.iter().map(|f| f.error.as_str()).collect();
        assert_eq!(errors, vec!["newer", "older"]);
        assert_eq!(report.unsent_count, 0);
        assert!(report.pending_proposals.is_empty());
    }

    #[test]
    fn test_duplicate_failure_rows_reported_once() {
        let report = classify(
            vec![failed("P1", Duration::hours(2), "x"), failed("P1", Duration::hours(2), "x")],
            now(),
        );
        assert_eq!(report.recent_failures.len(), 1);
    }

    #[test]
    fn test_pending_without_document_only_counted() {
        let report = classify(vec![row("P1", 1 << 35), row("P2", 1 << 35)], now());
        assert_eq!(report.unsent_count, 2);
        assert!(report.pending_proposals.is_empty());
    }

    #[test]
    fn test_proposed_listing_and_order() {
        let report = classify(
            vec![
                proposed("P3", 64 << 30, Duration::hours(50)),
                proposed("P2", 32 << 30, Duration::minutes(60 * 40 + 59)),
                proposed("P1", 32 << 30, Duration::hours(40)),
                proposed("P0", 32 << 30, Duration::hours(30)),
            ],
            now(),
        );

        let cids: Vec<&str> = report
            .pending_proposals
            .iter()
            .map(|p| p.piece_cid.as_str())
            .collect();
        assert_eq!(cids, vec!["P0", "P1", "P2", "P3"]);
        assert_eq!(report.pending_proposals[1].hours_remaining, 40);
        assert_eq!(report.pending_proposals[2].hours_remaining, 40);
        assert!(report.pending_proposals[0]
            .sample_import_cmd
            .starts_with("lotus-miner storage-deals import-data bafyprop-P0 "));
    }

    #[test]
    fn test_summary_mentions_counts() {
        let sp: ProviderId = "f01000".parse().unwrap();
        let report = classify(
            vec![
                row("P1", 1),
                proposed("P2", 1, Duration::hours(10)),
                failed("P3", Duration::hours(1), "err"),
            ],
            now(),
        );
        let summary = report.summary(&sp);
        assert!(summary.contains("SP f01000"));
        assert!(summary.contains("1 proposals to send out, and 1 successful proposals"));
        assert!(summary.contains("there were 1 proposal errors"));
    }

    #[test]
    fn test_summary_omits_failures_when_none() {
        let sp: ProviderId = "f01000".parse().unwrap();
        let summary = classify(vec![row("P1", 1)], now()).summary(&sp);
        assert!(!summary.contains("proposal errors"));
    }

    #[test]
    fn test_recent_failures_omitted_from_json_when_empty() {
        let report = classify(vec![row("P1", 1)], now());
        let v = serde_json::to_value(&report).unwrap();
        assert!(v.get("recent_failures").is_none());
        assert!(v["pending_proposals"].as_array().unwrap().is_empty());
    }
}
