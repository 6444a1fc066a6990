//! Replica count decoding
//!
//! The candidate query embeds two JSON documents per piece, one for active
//! replicas and one for in-flight proposals, shaped as
//! `{"<scope>": {"<scope value>": <count>}}`. They are decoded into
//! [`ScopeCounts`] keyed by the closed [`Scope`] enumeration, so an unknown
//! scope or a negative count fails at decode time.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{EligibilityError, Result};

/// Placement scope a replica count or cap applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Total,
    OrgId,
    City,
    Country,
    Continent,
}

impl Scope {
    /// Evaluation order for quota checks
    pub const ALL: [Scope; 5] = [
        Scope::Total,
        Scope::OrgId,
        Scope::City,
        Scope::Country,
        Scope::Continent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Total => "total",
            Scope::OrgId => "org_id",
            Scope::City => "city",
            Scope::Country => "country",
            Scope::Continent => "continent",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts for one replica state: scope -> scope value -> count
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "NullableCounts")]
pub struct ScopeCounts(HashMap<Scope, HashMap<String, u64>>);

/// Wire shape of a count document; `null` at any level reads as empty
#[derive(Deserialize)]
#[serde(transparent)]
struct NullableCounts(Option<HashMap<Scope, Option<HashMap<String, Option<u64>>>>>);

impl From<NullableCounts> for ScopeCounts {
    fn from(raw: NullableCounts) -> Self {
        raw.0
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(scope, values)| {
                values
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |(value, count)| (scope, value, count.unwrap_or(0)))
            })
            .collect()
    }
}

impl ScopeCounts {
    /// Count for a scope value, zero when absent
    pub fn get(&self, scope: Scope, value: &str) -> u64 {
        self.0
            .get(&scope)
            .and_then(|values| values.get(value))
            .copied()
            .unwrap_or(0)
    }
}

impl FromIterator<(Scope, String, u64)> for ScopeCounts {
    fn from_iter<I: IntoIterator<Item = (Scope, String, u64)>>(iter: I) -> Self {
        let mut map: HashMap<Scope, HashMap<String, u64>> = HashMap::new();
        for (scope, value, count) in iter {
            map.entry(scope).or_default().insert(value, count);
        }
        Self(map)
    }
}

/// Active and proposed counts for one piece
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub active: ScopeCounts,
    pub proposed: ScopeCounts,
}

impl ReplicaCounts {
    /// Combined active + proposed count for a scope value
    pub fn combined(&self, scope: Scope, value: &str) -> u64 {
        self.active
            .get(scope, value)
            .saturating_add(self.proposed.get(scope, value))
    }
}

/// Decode the pair of embedded count documents for `piece_cid`.
///
/// Returns `Ok(None)` when neither document is present (no quota applies).
/// Any other shape is corrupt upstream data.
pub fn decode_replica_counts(
    piece_cid: &str,
    active: Option<&str>,
    proposed: Option<&str>,
) -> Result<Option<ReplicaCounts>> {
    let malformed = |reason: String| EligibilityError::MalformedCounts {
        piece_cid: piece_cid.to_string(),
        reason,
    };

    match (active, proposed) {
        (None, None) => Ok(None),
        (Some(active), Some(proposed)) => {
            let active: ScopeCounts = serde_json::from_str(active)
                .map_err(|e| malformed(format!("active counts: {}", e)))?;
            let proposed: ScopeCounts = serde_json::from_str(proposed)
                .map_err(|e| malformed(format!("proposed counts: {}", e)))?;
            Ok(Some(ReplicaCounts { active, proposed }))
        }
        (Some(_), None) => Err(malformed("proposed counts missing".to_string())),
        (None, Some(_)) => Err(malformed("active counts missing".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_counts_skip_decoding() {
        assert_eq!(decode_replica_counts("p", None, None).unwrap(), None);
    }

    #[test]
    fn test_decode_and_lookup() {
        let counts = decode_replica_counts(
            "p",
            Some(r#"{"total":{"total":3},"org_id":{"org-a":2},"city":{"Berlin":1}}"#),
            Some(r#"{"total":{"total":1},"org_id":{"org-a":1}}"#),
        )
        .unwrap()
        .unwrap();

        assert_eq!(counts.combined(Scope::Total, "total"), 4);
        assert_eq!(counts.combined(Scope::OrgId, "org-a"), 3);
        assert_eq!(counts.combined(Scope::City, "Berlin"), 1);
        assert_eq!(counts.combined(Scope::Country, "DE"), 0);
        assert_eq!(counts.combined(Scope::OrgId, "org-b"), 0);
    }

    #[test]
    fn test_unknown_scope_rejected() {
        let err = decode_replica_counts("p", Some(r#"{"planet":{"earth":1}}"#), Some("{}"))
            .unwrap_err();
        assert!(err.is_consistency_violation());
    }

    #[test]
    fn test_negative_count_rejected() {
        assert!(decode_replica_counts("p", Some(r#"{"total":{"total":-1}}"#), Some("{}")).is_err());
    }

    #[test]
    fn test_half_present_pair_rejected() {
        let err = decode_replica_counts("bagapiece", Some("{}"), None).unwrap_err();
        assert!(err.to_string().contains("bagapiece"));
    }

    #[test]
    fn test_null_documents_read_as_empty() {
        let counts = decode_replica_counts(
            "p",
            Some("null"),
            Some(r#"{"city":null,"org_id":{"org-a":null,"org-b":2}}"#),
        )
        .unwrap()
        .unwrap();

        assert_eq!(counts.active, ScopeCounts::default());
        assert_eq!(counts.combined(Scope::City, "Berlin"), 0);
        assert_eq!(counts.combined(Scope::OrgId, "org-a"), 0);
        assert_eq!(counts.combined(Scope::OrgId, "org-b"), 2);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_replica_counts("p", Some("not json"), Some("{}")).is_err());
    }
}
