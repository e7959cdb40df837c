//! # Tenant Mapping Strategies
//!
//! The heuristics that propose a tenant for an unmapped company id are
//! pluggable: the resolver uses [`AdoptionStrategy`] inline, the watchdog
//! uses [`MajorityVoteStrategy`] over the delivery log. Both encode the
//! single-tenant-per-company assumption explicitly, in one testable place
//! each, instead of cascading inline conditionals.

use crate::error::Result;
use crate::store::DeliveryStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Proposes a tenant to bind to an external company id
#[async_trait]
pub trait MappingStrategy: Send + Sync {
    /// The tenant id to bind, or `None` when the strategy has no opinion
    async fn propose(&self, store: &dyn DeliveryStore, company_id: &str) -> Result<Option<i64>>;
}

/// Adopt the earliest-created unmapped tenant that is actually usable:
/// at least one enabled rule and one active endpoint
#[derive(Debug, Default)]
pub struct AdoptionStrategy;

#[async_trait]
impl MappingStrategy for AdoptionStrategy {
    async fn propose(&self, store: &dyn DeliveryStore, company_id: &str) -> Result<Option<i64>> {
        let candidates = store.adoption_candidates().await?;
        if let Some(candidate) = candidates.first() {
            debug!(
                tenant_id = candidate.tenant_id,
                company_id = %company_id,
                "Adoption strategy proposing earliest eligible tenant"
            );
            return Ok(Some(candidate.tenant_id));
        }
        Ok(None)
    }
}

/// Bind only when a strict majority of the tenant's recent delivery-log
/// rows carry the same company id. Used the other way around by the
/// watchdog: given a tenant, find the company id worth binding.
#[derive(Debug)]
pub struct MajorityVoteStrategy {
    pub sample_size: i64,
}

impl Default for MajorityVoteStrategy {
    fn default() -> Self {
        Self { sample_size: 50 }
    }
}

impl MajorityVoteStrategy {
    /// The company id a strict majority of recent log rows voted for
    pub async fn winning_company_id(
        &self,
        store: &dyn DeliveryStore,
        tenant_id: i64,
    ) -> Result<Option<String>> {
        let company_ids = store
            .recent_company_ids_for_tenant(tenant_id, self.sample_size)
            .await?;
        if company_ids.is_empty() {
            return Ok(None);
        }

        let total = company_ids.len();
        let mut tally: HashMap<&str, usize> = HashMap::new();
        for company_id in &company_ids {
            *tally.entry(company_id.as_str()).or_default() += 1;
        }

        let (winner, votes) = tally
            .into_iter()
            .max_by_key(|(_, votes)| *votes)
            .expect("tally is non-empty");

        // Strict majority; a tie proposes nothing
        if votes * 2 > total {
            Ok(Some(winner.to_string()))
        } else {
            Ok(None)
        }
    }
}
