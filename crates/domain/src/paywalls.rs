use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::SdkResult;
use crate::cache::ObjectCache;
use crate::error::SdkError;
use crate::paywall::{IntroductoryOfferEligibility, Paywall, PaywallProduct, ProductsFetchPolicy};
use crate::ports::backend::Backend;
use crate::ports::catalog::ProductCatalog;
use crate::single_flight::SingleFlight;
use crate::versioned::{FetchedValue, VersionedValue};

/// Every cached paywall lives in one persisted list record; an empty list is
/// written as a clear and reads back as "no cache".
const PAYWALLS_CACHE_KEY: &str = "paywalls";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct StoredPaywall {
    profile_id: String,
    paywall: VersionedValue<Paywall>,
}

type EligibilityMap = HashMap<String, IntroductoryOfferEligibility>;

/// Fetches and caches remotely configured paywalls for one profile identity
/// and resolves them to purchasable products with offer eligibility.
#[derive(Clone)]
pub struct PaywallResolver {
    profile_id: String,
    backend: Arc<dyn Backend>,
    catalog: Arc<dyn ProductCatalog>,
    cache: ObjectCache,
    fetches: SingleFlight<SdkResult<Paywall>>,
    validations: SingleFlight<SdkResult<EligibilityMap>>,
    eligibility: Arc<RwLock<EligibilityMap>>,
}

impl PaywallResolver {
    pub fn new(
        profile_id: impl Into<String>,
        backend: Arc<dyn Backend>,
        catalog: Arc<dyn ProductCatalog>,
        cache: ObjectCache,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            backend,
            catalog,
            cache,
            fetches: SingleFlight::new(),
            validations: SingleFlight::new(),
            eligibility: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Conditional fetch keyed by `(profile_id, paywall_id)`: a hash match
    /// returns the cached paywall unchanged, a new value replaces the cache
    /// slot, and a transport failure serves the stale cache when one exists.
    pub async fn get_paywall(&self, paywall_id: &str) -> SdkResult<Paywall> {
        let key = format!("{}:{paywall_id}", self.profile_id);
        let this = self.clone();
        let paywall_id = paywall_id.to_string();
        self.fetches
            .run(&key, || async move { this.fetch_or_fallback(&paywall_id).await })
            .await
    }

    async fn fetch_or_fallback(&self, paywall_id: &str) -> SdkResult<Paywall> {
        let cached = self.cached_paywall(paywall_id).await;
        let hash = cached.as_ref().map(|vv| vv.hash.clone());
        match self
            .backend
            .fetch_paywall(paywall_id, &self.profile_id, hash.as_deref())
            .await
        {
            Ok(FetchedValue::NotModified) => match cached {
                Some(vv) => Ok(vv.value),
                None => Err(SdkError::Decoding(
                    "hash match reported for an unconditional request".to_string(),
                )),
            },
            Ok(FetchedValue::New(vv)) => {
                self.store_paywall(vv.clone()).await;
                Ok(vv.value)
            }
            Err(err @ (SdkError::Network(_) | SdkError::Decoding(_))) => match cached {
                Some(vv) => {
                    tracing::warn!(
                        paywall_id,
                        error = %err,
                        "paywall refresh failed, serving cached paywall"
                    );
                    Ok(vv.value)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn cached_paywall(&self, paywall_id: &str) -> Option<VersionedValue<Paywall>> {
        let stored: Vec<StoredPaywall> = self.cache.get_list(PAYWALLS_CACHE_KEY).await?;
        stored
            .into_iter()
            .find(|entry| {
                entry.profile_id == self.profile_id && entry.paywall.value.paywall_id == paywall_id
            })
            .map(|entry| entry.paywall)
    }

    async fn store_paywall(&self, paywall: VersionedValue<Paywall>) {
        let mut stored: Vec<StoredPaywall> = self
            .cache
            .get_list(PAYWALLS_CACHE_KEY)
            .await
            .unwrap_or_default();
        stored.retain(|entry| {
            !(entry.profile_id == self.profile_id
                && entry.paywall.value.paywall_id == paywall.value.paywall_id)
        });
        stored.push(StoredPaywall {
            profile_id: self.profile_id.clone(),
            paywall,
        });
        self.cache.put_list(PAYWALLS_CACHE_KEY, &stored).await;
    }

    /// Drops every cached paywall scoped to this resolver's identity. Called
    /// when the identity is switched away from.
    pub async fn clear_cached_paywalls(&self) {
        let stored: Vec<StoredPaywall> = self
            .cache
            .get_list(PAYWALLS_CACHE_KEY)
            .await
            .unwrap_or_default();
        let remaining: Vec<StoredPaywall> = stored
            .into_iter()
            .filter(|entry| entry.profile_id != self.profile_id)
            .collect();
        self.cache.put_list(PAYWALLS_CACHE_KEY, &remaining).await;
    }

    /// Resolves a paywall's product ids through the platform catalog and
    /// attaches introductory-offer eligibility. Eligibility needs a
    /// receipt-validation round trip; the fetch policy decides whether this
    /// call waits for it.
    pub async fn get_paywall_products(
        &self,
        paywall: &Paywall,
        fetch_policy: ProductsFetchPolicy,
    ) -> SdkResult<Vec<PaywallProduct>> {
        let descriptors = self.catalog.products(&paywall.product_ids).await?;
        match fetch_policy {
            ProductsFetchPolicy::Default => {
                if !self.has_eligibility_for(&paywall.product_ids).await {
                    self.spawn_validation(paywall.product_ids.clone());
                }
            }
            ProductsFetchPolicy::WaitForReceiptValidation => {
                if let Err(err) = self.validate_eligibility(paywall.product_ids.clone()).await {
                    tracing::warn!(
                        error = %err,
                        "receipt validation failed, serving products with unknown eligibility"
                    );
                }
            }
        }
        let known = self.eligibility.read().await;
        Ok(descriptors
            .into_iter()
            .map(|descriptor| PaywallProduct {
                paywall_variation_id: paywall.variation_id.clone(),
                promotional_offer_id: descriptor.promotional_offer_id(),
                introductory_offer_eligibility: known
                    .get(&descriptor.vendor_product_id)
                    .copied()
                    .unwrap_or_default(),
                descriptor,
            })
            .collect())
    }

    async fn has_eligibility_for(&self, product_ids: &[String]) -> bool {
        let known = self.eligibility.read().await;
        product_ids.iter().all(|id| known.contains_key(id))
    }

    fn spawn_validation(&self, product_ids: Vec<String>) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.validate_eligibility(product_ids).await {
                tracing::warn!(error = %err, "background receipt validation failed");
            }
        });
    }

    async fn validate_eligibility(&self, product_ids: Vec<String>) -> SdkResult<()> {
        let key = format!("eligibility:{}", self.profile_id);
        let this = self.clone();
        let resolved = self
            .validations
            .run(&key, || async move {
                this.backend
                    .introductory_eligibility(&this.profile_id, &product_ids)
                    .await
            })
            .await?;
        self.eligibility.write().await.extend(resolved);
        Ok(())
    }
}
