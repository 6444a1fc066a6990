//! Core records returned by the eligibility endpoints
//!
//! A [`Piece`] groups every [`Source`] that already supplies it. Sources carry
//! a few derived values (type tag, expiry in nanoseconds, coarse chain-day
//! expiry, system id) that only exist to give listings a stable order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::EligibilityError;

/// Unix timestamp of the Filecoin mainnet genesis block
pub const FIL_GENESIS_UNIX: i64 = 1_598_306_400;

/// Seconds per chain epoch
pub const EPOCH_SECONDS: i64 = 30;

/// Chain epochs per day
pub const EPOCHS_PER_DAY: i64 = 2880;

/// Convert a wall-clock time to the chain epoch it falls in
pub fn epoch_at(t: DateTime<Utc>) -> i64 {
    (t.timestamp() - FIL_GENESIS_UNIX).div_euclid(EPOCH_SECONDS)
}

/// Shorten a CID for use in file names: first and last eight characters
pub fn trim_cid(cid: &str) -> String {
    if cid.len() <= 24 || !cid.is_ascii() {
        return cid.to_string();
    }
    format!("{}~{}", &cid[..8], &cid[cid.len() - 8..])
}

// ============================================================================
// Provider identity
// ============================================================================

/// Storage provider actor address, e.g. `f01787692`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProviderId {
    type Err = EligibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("f0")
            .or_else(|| s.strip_prefix("t0"))
            .ok_or_else(|| {
                EligibilityError::InvalidInput(format!(
                    "provider id '{}' is not an f0/t0 actor address",
                    s
                ))
            })?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EligibilityError::InvalidInput(format!(
                "provider id '{}' must be followed by a numeric actor id",
                s
            )));
        }

        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ProviderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Kind of supply point. Ordering is the listing order: FilPlus deals first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    FilecoinFilplus,
    Filecoin,
}

/// An existing deal that already supplies a piece at one provider
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub source_type: SourceType,
    pub provider_id: String,
    pub deal_id: i64,
    pub original_payload_cid: String,
    pub normalized_payload_cid: String,
    pub is_filplus: bool,
    pub deal_expiration: DateTime<Utc>,
    pub deal_expiration_epoch: i64,
    pub sample_retrieve_cmd: String,

    #[serde(skip)]
    expiry_unix_nano: i64,
    #[serde(skip)]
    expiry_coarse: i64,
    #[serde(skip)]
    sys_id: String,
}

/// Raw fields of a source as they arrive from the candidate query
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub provider_id: String,
    pub deal_id: i64,
    pub original_payload_cid: String,
    pub normalized_payload_cid: String,
    pub is_filplus: bool,
    pub deal_expiration: DateTime<Utc>,
}

impl Source {
    /// Build a source for `piece_cid`, computing its derived values
    pub fn new(piece_cid: &str, rec: SourceRecord) -> Self {
        let source_type = if rec.is_filplus {
            SourceType::FilecoinFilplus
        } else {
            SourceType::Filecoin
        };
        let epoch = epoch_at(rec.deal_expiration);

        let sample_retrieve_cmd = format!(
            "lotus client retrieve --provider {} --maxPrice 0 --allow-local --car '{}' $(pwd)/{}__{}.car",
            rec.provider_id,
            rec.normalized_payload_cid,
            trim_cid(piece_cid),
            trim_cid(&rec.normalized_payload_cid),
        );

        Self {
            source_type,
            expiry_unix_nano: rec
                .deal_expiration
                .timestamp_nanos_opt()
                .unwrap_or(i64::MAX),
            expiry_coarse: epoch.div_euclid(EPOCHS_PER_DAY),
            sys_id: format!("fil/{}/{}", rec.provider_id, rec.deal_id),
            deal_expiration_epoch: epoch,
            sample_retrieve_cmd,
            provider_id: rec.provider_id,
            deal_id: rec.deal_id,
            original_payload_cid: rec.original_payload_cid,
            normalized_payload_cid: rec.normalized_payload_cid,
            is_filplus: rec.is_filplus,
            deal_expiration: rec.deal_expiration,
        }
    }

    pub fn src_type(&self) -> SourceType {
        self.source_type
    }

    pub fn expiry_unix_nano(&self) -> i64 {
        self.expiry_unix_nano
    }

    /// Expiry bucketed to whole chain days
    pub fn expiry_coarse(&self) -> i64 {
        self.expiry_coarse
    }

    pub fn sys_id(&self) -> &str {
        &self.sys_id
    }
}

// ============================================================================
// Pieces
// ============================================================================

/// A piece offered for replication, with every source that can supply it
#[derive(Debug, Clone, Serialize)]
pub struct Piece {
    pub piece_cid: String,
    pub dataset: String,
    pub padded_piece_size: u64,
    pub payload_cids: Vec<String>,
    pub sources: Vec<Source>,
    pub sample_request_cmd: String,
}

impl Piece {
    pub fn new(
        piece_cid: String,
        dataset: String,
        padded_piece_size: u64,
        sample_request_cmd: String,
    ) -> Self {
        Self {
            piece_cid,
            dataset,
            padded_piece_size,
            payload_cids: Vec::new(),
            sources: Vec::new(),
            sample_request_cmd,
        }
    }

    /// Append a source, recording its payload CID once
    pub fn push_source(&mut self, source: Source) {
        if !self.payload_cids.contains(&source.normalized_payload_cid) {
            self.payload_cids.push(source.normalized_payload_cid.clone());
        }
        self.sources.push(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(provider: &str, deal: i64, filplus: bool) -> SourceRecord {
        SourceRecord {
            provider_id: provider.to_string(),
            deal_id: deal,
            original_payload_cid: "bafyorig".to_string(),
            normalized_payload_cid: "bafynorm".to_string(),
            is_filplus: filplus,
            deal_expiration: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_provider_id_parsing() {
        assert_eq!("f01787692".parse::<ProviderId>().unwrap().as_str(), "f01787692");
        assert!("t01000".parse::<ProviderId>().is_ok());
        assert!("f1abcdef".parse::<ProviderId>().is_err());
        assert!("f0".parse::<ProviderId>().is_err());
        assert!("f012x4".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_trim_cid() {
        assert_eq!(trim_cid("bafyshort"), "bafyshort");
        assert_eq!(
            trim_cid("baga6ea4seaqao7s73y24kcutaosvacpdjgfe5pw76ooefnyqw4ynr3d2y6x2mpq"),
            "baga6ea4~2y6x2mpq"
        );
    }

    #[test]
    fn test_epoch_at_genesis() {
        let genesis = Utc.timestamp_opt(FIL_GENESIS_UNIX, 0).unwrap();
        assert_eq!(epoch_at(genesis), 0);
        assert_eq!(epoch_at(genesis + chrono::Duration::days(1)), EPOCHS_PER_DAY);
    }

    #[test]
    fn test_source_derived_values() {
        let s = Source::new("bagapiece", record("f01000", 7, true));
        assert_eq!(s.src_type(), SourceType::FilecoinFilplus);
        assert_eq!(s.sys_id(), "fil/f01000/7");
        assert_eq!(s.expiry_coarse(), s.deal_expiration_epoch / EPOCHS_PER_DAY);
        assert!(s.sample_retrieve_cmd.contains("--provider f01000"));

        let plain = Source::new("bagapiece", record("f01000", 8, false));
        assert!(s.src_type() < plain.src_type());
    }

    #[test]
    fn test_piece_payloads_deduplicated() {
        let mut p = Piece::new("bagapiece".into(), "ds".into(), 1 << 35, String::new());
        p.push_source(Source::new("bagapiece", record("f01000", 1, true)));
        p.push_source(Source::new("bagapiece", record("f01001", 2, true)));
        assert_eq!(p.payload_cids, vec!["bafynorm".to_string()]);
        assert_eq!(p.sources.len(), 2);
    }

    #[test]
    fn test_source_serializes_without_ordering_fields() {
        let s = Source::new("bagapiece", record("f01000", 7, false));
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["source_type"], "filecoin");
        assert!(v.get("sys_id").is_none());
        assert!(v.get("expiry_coarse").is_none());
    }
}
