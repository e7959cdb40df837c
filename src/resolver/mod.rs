//! # Tenant Resolver
//!
//! Maps an inbound event's external identifiers to an internal tenant.
//! Resolution is a cascade where every successful step persists a binding,
//! so future events for the same company short-circuit at the direct
//! lookup:
//!
//! 1. direct lookup by external company id
//! 2. lookup by external user id, auto-binding the company id on a hit
//! 3. the pluggable mapping strategy (adoption of an eligible unmapped tenant)
//! 4. auto-provisioning a fresh tenant for the company id
//!
//! `resolve` is idempotent under concurrency: the provisioning step is an
//! upsert converging on the unique company-id index, and bindings are
//! conditional updates, so N simultaneous resolutions of one company id
//! produce exactly one tenant row.

pub mod strategy;

use crate::error::{RelayError, Result};
use crate::events::CrmEvent;
use crate::models::Tenant;
use crate::store::DeliveryStore;
use std::sync::Arc;
use tracing::{debug, info};

pub use strategy::{AdoptionStrategy, MajorityVoteStrategy, MappingStrategy};

/// Resolves events to tenants, binding and provisioning as needed
pub struct TenantResolver {
    store: Arc<dyn DeliveryStore>,
    strategy: Arc<dyn MappingStrategy>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self {
            store,
            strategy: Arc::new(AdoptionStrategy),
        }
    }

    pub fn with_strategy(store: Arc<dyn DeliveryStore>, strategy: Arc<dyn MappingStrategy>) -> Self {
        Self { store, strategy }
    }

    /// Resolve the tenant for an event, exhausting the cascade before
    /// failing with `NoTenantFound`
    pub async fn resolve(&self, event: &CrmEvent) -> Result<Tenant> {
        let company_id = event.company_id.as_deref();

        // 1. Direct lookup by company id
        if let Some(company_id) = company_id {
            if let Some(tenant) = self.store.find_tenant_by_company_id(company_id).await? {
                return Ok(tenant);
            }
        }

        // 2. Lookup by user id; bind the company id so step 1 hits next time
        if let Some(user_id) = event.user_id.as_deref() {
            if let Some(tenant) = self.store.find_tenant_by_user_id(user_id).await? {
                if let Some(company_id) = company_id {
                    if tenant.external_company_id.is_none() {
                        let bound = self
                            .store
                            .bind_company_id(tenant.tenant_id, company_id)
                            .await?;
                        if bound {
                            info!(
                                tenant_id = tenant.tenant_id,
                                company_id = %company_id,
                                "Auto-bound company id via user mapping"
                            );
                        }
                    }
                }
                return Ok(tenant);
            }
        }

        let Some(company_id) = company_id else {
            return Err(RelayError::no_tenant_found("<missing company id>"));
        };

        // 3. Mapping strategy (adoption of an eligible unmapped tenant)
        if let Some(tenant_id) = self.strategy.propose(self.store.as_ref(), company_id).await? {
            if self.store.bind_company_id(tenant_id, company_id).await? {
                info!(
                    tenant_id = tenant_id,
                    company_id = %company_id,
                    "Adopted unmapped tenant for company"
                );
            } else {
                debug!(
                    tenant_id = tenant_id,
                    company_id = %company_id,
                    "Lost adoption race; falling through to direct lookup"
                );
            }
            // Either we bound it or a concurrent resolver did; the mapping
            // now exists, so re-read the canonical row.
            if let Some(tenant) = self.store.find_tenant_by_company_id(company_id).await? {
                return Ok(tenant);
            }
        }

        // 4. Provision a fresh tenant; the upsert converges under concurrency
        let tenant = self
            .store
            .upsert_tenant_for_company(company_id, &format!("Company {company_id}"))
            .await?;
        info!(
            tenant_id = tenant.tenant_id,
            company_id = %company_id,
            "Auto-provisioned tenant for company"
        );
        Ok(tenant)
    }
}
