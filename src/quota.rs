//! Replica quota decision
//!
//! A piece is eligible for a provider only while every scope the provider
//! occupies still has room: active + proposed must be strictly below the cap.
//! Reaching the cap exactly already counts as full.

use crate::caps::ScopeCaps;
use crate::counts::{ReplicaCounts, Scope};

/// Outcome of checking one piece against the caps
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaVerdict {
    Admit,
    /// First scope (in [`Scope::ALL`] order) found at or above its cap
    Breach {
        scope: Scope,
        value: String,
        count: u64,
        cap: u64,
    },
}

impl QuotaVerdict {
    pub fn is_admit(&self) -> bool {
        matches!(self, QuotaVerdict::Admit)
    }
}

/// Evaluates replica counts against one provider's scope caps
#[derive(Debug, Clone)]
pub struct QuotaFilter {
    caps: ScopeCaps,
}

impl QuotaFilter {
    pub fn new(caps: ScopeCaps) -> Self {
        Self { caps }
    }

    pub fn evaluate(&self, counts: &ReplicaCounts) -> QuotaVerdict {
        for scope in Scope::ALL {
            let (value, cap) = self.caps.limit_for(scope);
            let count = counts.combined(scope, value);
            if count >= cap {
                return QuotaVerdict::Breach {
                    scope,
                    value: value.to_string(),
                    count,
                    cap,
                };
            }
        }
        QuotaVerdict::Admit
    }
}
