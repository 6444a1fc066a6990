//! Scope caps for a requesting provider
//!
//! A provider sits in an org / city / country / continent hierarchy; each
//! level carries a replica cap, plus one program-wide cap.

use tracing::debug;

use crate::counts::Scope;
use crate::deal_store::DealStore;
use crate::error::{EligibilityError, Result};
use crate::types::ProviderId;

/// Where a provider is placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPlacement {
    pub org_id: String,
    pub city: String,
    pub country: String,
    pub continent: String,
}

/// The five replica caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapSet {
    pub per_org: u64,
    pub per_city: u64,
    pub per_country: u64,
    pub per_continent: u64,
    pub program_max: u64,
}

/// A provider's placement together with the caps that apply to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeCaps {
    pub placement: ProviderPlacement,
    pub caps: CapSet,
}

impl ScopeCaps {
    /// The scope value the provider occupies and the cap for that scope
    pub fn limit_for(&self, scope: Scope) -> (&str, u64) {
        match scope {
            Scope::Total => ("total", self.caps.program_max),
            Scope::OrgId => (&self.placement.org_id, self.caps.per_org),
            Scope::City => (&self.placement.city, self.caps.per_city),
            Scope::Country => (&self.placement.country, self.caps.per_country),
            Scope::Continent => (&self.placement.continent, self.caps.per_continent),
        }
    }
}

/// Resolves placement and caps through the deal store
pub struct ScopeCapLoader<'a> {
    store: &'a dyn DealStore,
}

impl<'a> ScopeCapLoader<'a> {
    pub fn new(store: &'a dyn DealStore) -> Self {
        Self { store }
    }

    pub async fn load(&self, provider: &ProviderId) -> Result<ScopeCaps> {
        let caps = self
            .store
            .scope_caps(provider)
            .await?
            .ok_or_else(|| EligibilityError::UnknownProvider(provider.to_string()))?;

        debug!(
            provider = %provider,
            org = %caps.placement.org_id,
            city = %caps.placement.city,
            country = %caps.placement.country,
            continent = %caps.placement.continent,
            "Loaded scope caps"
        );
        Ok(caps)
    }
}
