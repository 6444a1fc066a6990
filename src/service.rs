//! Request orchestration for the two read endpoints
//!
//! Ties the pieces together per request: limit validation, the structural
//! eligibility check, cap loading, aggregation, ranking and the explanatory
//! text, plus the proposal report.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::aggregate::CandidateAggregator;
use crate::caps::ScopeCapLoader;
use crate::commands::CommandTemplate;
use crate::config::Config;
use crate::deal_store::{CandidateQuery, DealStore, ListingScope};
use crate::error::{EligibilityError, Result};
use crate::proposals::{self, ProposalReport};
use crate::quota::QuotaFilter;
use crate::rank;
use crate::types::{Piece, ProviderId};

/// Verified identity of the calling provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub provider: ProviderId,
    /// Advertised free capacity in bytes
    pub capacity: u64,
}

/// Result of an eligible-pieces request
#[derive(Debug, Clone)]
pub enum Listing {
    Eligible { pieces: Vec<Piece>, info: String },
    /// The provider may not request deals at all right now
    Ineligible { reason: String },
}

/// Parse the optional `limit` query value
pub fn parse_limit(raw: Option<&str>, default: u64) -> Result<u64> {
    let Some(raw) = raw.filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    let invalid = || {
        EligibilityError::InvalidInput(format!(
            "provided limit '{}' is not a valid positive integer",
            raw
        ))
    };
    // digits only: no sign, no whitespace
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid()),
    }
}

pub struct EligibilityService {
    store: Arc<dyn DealStore>,
    commands: CommandTemplate,
    default_limit: u64,
    renewal_window_days: i64,
    max_outstanding_bytes: u64,
}

impl EligibilityService {
    pub fn new(store: Arc<dyn DealStore>, config: &Config) -> Self {
        Self {
            store,
            commands: CommandTemplate::new(config.api_base_url.clone()),
            default_limit: config.default_limit,
            renewal_window_days: config.renewal_window_days,
            max_outstanding_bytes: config.max_outstanding_bytes(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DealStore> {
        &self.store
    }

    /// Why the provider may not request deals right now, if anything
    pub async fn ineligibility_reason(&self, provider: &ProviderId) -> Result<Option<String>> {
        let standing = self.store.provider_standing(provider).await?;

        if !standing.registered {
            return Ok(Some(format!("provider {} is not registered with the program", provider)));
        }
        if let Some(reason) = standing.block_reason {
            return Ok(Some(reason));
        }
        if standing.outstanding_bytes >= self.max_outstanding_bytes {
            return Ok(Some(format!(
                "provider {} has {} GiB of outstanding proposals, at or above the {} GiB ceiling",
                provider,
                standing.outstanding_bytes >> 30,
                self.max_outstanding_bytes >> 30
            )));
        }
        Ok(None)
    }

    /// Eligible pieces for the caller, ranked and cut to `limit`
    pub async fn list_eligible(
        &self,
        caller: &Caller,
        scope: ListingScope,
        limit: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Listing> {
        let limit = parse_limit(limit, self.default_limit)?;

        if let Some(reason) = self.ineligibility_reason(&caller.provider).await? {
            info!(provider = %caller.provider, reason = %reason, "Provider currently ineligible");
            return Ok(Listing::Ineligible { reason });
        }

        let quota = match scope {
            ListingScope::Anywhere => {
                let caps = ScopeCapLoader::new(self.store.as_ref())
                    .load(&caller.provider)
                    .await?;
                Some(QuotaFilter::new(caps))
            }
            ListingScope::SpLocal => None,
        };

        let expiration_cutoff = self.expiration_cutoff(now)?;
        let rows = self
            .store
            .candidates(CandidateQuery {
                scope,
                provider: &caller.provider,
                capacity: caller.capacity,
                expiration_cutoff,
            })
            .await?;

        let mut aggregator = CandidateAggregator::new(
            &caller.provider,
            caller.capacity,
            quota.as_ref(),
            &self.commands,
        );
        aggregator.ingest_all(rows)?;
        let stats = aggregator.stats();
        debug!(provider = %caller.provider, ?stats, "Aggregated candidate rows");

        let ranked = rank::rank(aggregator.into_pieces(), limit);

        let mut info = self.listing_info(caller, scope);
        if ranked.truncated() {
            let follow_up = self.commands.authed_request(
                &caller.provider,
                &format!("{}?limit={}", scope.path(), ranked.total),
            );
            info = format!(
                "{}\n\n{}",
                rank::truncation_note(ranked.total, limit, &follow_up),
                info
            );
        }

        info!(
            provider = %caller.provider,
            listing = scope.path(),
            total = ranked.total,
            returned = ranked.pieces.len(),
            "Eligible pieces listed"
        );

        Ok(Listing::Eligible {
            pieces: ranked.pieces,
            info,
        })
    }

    /// Pending / proposed / recently failed proposals for the provider
    pub async fn pending_proposals(
        &self,
        provider: &ProviderId,
        now: DateTime<Utc>,
    ) -> Result<(ProposalReport, String)> {
        let rows = self.store.open_proposals(provider, now).await?;
        let report = proposals::classify(rows, now);
        let summary = report.summary(provider);

        info!(
            provider = %provider,
            unsent = report.unsent_count,
            proposed = report.pending_proposals.len(),
            failures = report.recent_failures.len(),
            "Pending proposals reported"
        );
        Ok((report, summary))
    }

    /// End of the renewal window starting at `now`
    fn expiration_cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_days(self.renewal_window_days)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| {
                EligibilityError::Config(format!(
                    "renewal window of {} days is out of range",
                    self.renewal_window_days
                ))
            })
    }

    fn listing_info(&self, caller: &Caller, scope: ListingScope) -> String {
        let pending_cmd = self.commands.authed_request(&caller.provider, "/pending_proposals");
        let footer = [
            "Once you have selected a Piece CID you would like to renew, and are reasonably confident",
            "you can obtain the data for it - request a deal from the system by invoking the API as",
            "shown in the corresponding `sample_request_cmd`. You will then receive a deal within 10 minutes,",
            "and can proceed to `lotus-miner storage-deals import-data ...` the corresponding car file.",
            "",
            "In order to see what proposals you have currently pending, you can invoke:",
        ]
        .join("\n");
        let footer = format!("{}\n {}", footer, pending_cmd);

        let header = match scope {
            ListingScope::SpLocal => {
                let body = [
                    "This list is ordered by most recently expiring/expired first, and reflects all pieces of data",
                    "that are still present within your own SP. It is recommended you perform these renewals first,",
                    "as data for them is readily obtainable.",
                ]
                .join("\n");
                format!(
                    "List of qualifying Piece CIDs currently available within SP {} itself\n\n{}",
                    caller.provider, body
                )
            }
            ListingScope::Anywhere => [
                "List of qualifying Piece CIDs together with their availability from various sources.",
                "",
                "In order to satisfy a FilPlus deal from the evergreen engine, all you need to do is obtain the",
                "corresponding .car file (usually by retrieving it from one of the sources within this list).",
            ]
            .join("\n"),
        };

        format!("{}\n\n{}", header, footer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None, 128).unwrap(), 128);
        assert_eq!(parse_limit(Some(""), 128).unwrap(), 128);
        assert_eq!(parse_limit(Some("5"), 128).unwrap(), 5);
        assert!(parse_limit(Some("0"), 128).is_err());
        assert!(parse_limit(Some("-3"), 128).is_err());
        assert!(parse_limit(Some("+5"), 128).is_err());
        assert!(parse_limit(Some(" 5"), 128).is_err());
        assert!(parse_limit(Some("99999999999999999999999"), 128).is_err());
        let err = parse_limit(Some("ten"), 128).unwrap_err();
        assert!(matches!(err, EligibilityError::InvalidInput(ref m) if m.contains("'ten'")));
    }
}
