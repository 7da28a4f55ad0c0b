use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

use crate::SdkResult;
use crate::error::SdkError;
use crate::paywall::PaywallProduct;
use crate::ports::backend::Backend;
use crate::ports::purchases::{
    OfferSigningSupport, PaymentRequest, PurchaseContext, PurchaseQueue, SettledTransaction,
};
use crate::profile::Profile;
use crate::profiles::ProfileManager;

/// Drives a purchase through the platform queue and reconciles the outcome
/// with the backend: the settled transaction is tagged with the paywall
/// variation it came from and the profile is refreshed to pick up the new
/// entitlements.
#[derive(Clone)]
pub struct PurchaseReconciler {
    backend: Arc<dyn Backend>,
    queue: Arc<dyn PurchaseQueue>,
    offer_signing: OfferSigningSupport,
    /// Held shared for the duration of every reconciliation; identity
    /// switches take it exclusively so they never interleave with one.
    identity_gate: Arc<RwLock<()>>,
    pending: Arc<Mutex<Vec<PurchaseContext>>>,
}

impl PurchaseReconciler {
    pub fn new(
        backend: Arc<dyn Backend>,
        queue: Arc<dyn PurchaseQueue>,
        offer_signing: OfferSigningSupport,
        identity_gate: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            backend,
            queue,
            offer_signing,
            identity_gate,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// True while at least one purchase is between submission and settlement.
    pub fn is_reconciling(&self) -> bool {
        !self.pending.lock().expect("pending purchases lock").is_empty()
    }

    pub async fn make_purchase(
        &self,
        profiles: &ProfileManager,
        product: &PaywallProduct,
    ) -> SdkResult<Profile> {
        // Gate first: a purchase that races an identity switch must wait it
        // out rather than reconcile against the outgoing profile.
        let _guard = self.identity_gate.read().await;
        if !self.queue.can_transact() {
            return Err(SdkError::NotEligibleToTransact);
        }

        let offer_signature = match (&product.promotional_offer_id, self.offer_signing) {
            (Some(discount_id), OfferSigningSupport::Supported) => {
                let signature = self
                    .backend
                    .sign_subscription_offer(
                        profiles.profile_id(),
                        product.vendor_product_id(),
                        discount_id,
                    )
                    .await
                    .map_err(|err| SdkError::DiscountSigningFailed(err.to_string()))?;
                Some(signature)
            }
            _ => None,
        };

        let payment = PaymentRequest {
            vendor_product_id: product.vendor_product_id().to_string(),
            quantity: 1,
            offer_signature,
        };
        let context = PurchaseContext {
            vendor_product_id: product.vendor_product_id().to_string(),
            paywall_variation_id: product.paywall_variation_id.clone(),
            promotional_offer_id: product.promotional_offer_id.clone(),
        };

        self.track(&context);
        let settled = match self.queue.submit(payment, context.clone()).await {
            Ok(settled) => settled,
            Err(err) => {
                self.untrack(&context);
                return Err(err);
            }
        };
        let outcome = self.settle(profiles, &settled, &context.paywall_variation_id).await;
        self.untrack(&context);
        outcome
    }

    /// Replays the platform's transaction history and refreshes the profile so
    /// previously purchased entitlements reappear.
    pub async fn restore_purchases(&self, profiles: &ProfileManager) -> SdkResult<Profile> {
        let _guard = self.identity_gate.read().await;
        let restored = self.queue.restore_all().await?;
        tracing::info!(count = restored.len(), "restored transactions replayed");
        profiles.get_profile().await
    }

    async fn settle(
        &self,
        profiles: &ProfileManager,
        settled: &SettledTransaction,
        variation_id: &str,
    ) -> SdkResult<Profile> {
        // Attribution is best effort: a lost variation tag must not fail a
        // purchase the store has already charged for.
        if let Err(err) = profiles
            .set_variation_id(variation_id, &settled.transaction_id)
            .await
        {
            tracing::warn!(
                transaction_id = %settled.transaction_id,
                error = %err,
                "failed to tag transaction with paywall variation"
            );
        }
        profiles.get_profile().await
    }

    fn track(&self, context: &PurchaseContext) {
        self.pending
            .lock()
            .expect("pending purchases lock")
            .push(context.clone());
    }

    fn untrack(&self, context: &PurchaseContext) {
        let mut pending = self.pending.lock().expect("pending purchases lock");
        if let Some(position) = pending.iter().position(|entry| entry == context) {
            pending.remove(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::cache::ObjectCache;
    use crate::paywall::IntroductoryOfferEligibility;
    use crate::testing::{MemStore, MockBackend, MockQueue, descriptor, profile, signature};
    use crate::versioned::{FetchedValue, VersionedValue};

    fn manager(backend: Arc<MockBackend>) -> ProfileManager {
        let cache = ObjectCache::new(Arc::new(MemStore::default()));
        ProfileManager::new("profile-1", backend, cache)
    }

    fn reconciler(
        backend: Arc<MockBackend>,
        queue: Arc<MockQueue>,
        offer_signing: OfferSigningSupport,
    ) -> PurchaseReconciler {
        PurchaseReconciler::new(backend, queue, offer_signing, Arc::new(RwLock::new(())))
    }

    fn product(promo: bool) -> PaywallProduct {
        let descriptor = descriptor("product-1", promo);
        PaywallProduct {
            promotional_offer_id: descriptor.promotional_offer_id(),
            descriptor,
            paywall_variation_id: "var-1".to_string(),
            introductory_offer_eligibility: IntroductoryOfferEligibility::Unknown,
        }
    }

    #[tokio::test]
    async fn ineligible_device_fails_before_touching_queue_or_backend() {
        let backend = Arc::new(MockBackend::default());
        let queue = Arc::new(MockQueue {
            transactable: false,
            ..MockQueue::default()
        });
        let reconciler = reconciler(backend.clone(), queue.clone(), OfferSigningSupport::Supported);

        let result = reconciler
            .make_purchase(&manager(backend.clone()), &product(false))
            .await;
        assert_eq!(result, Err(SdkError::NotEligibleToTransact));
        assert_eq!(queue.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.sign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn signing_failure_aborts_before_submission() {
        let backend = Arc::new(MockBackend::default());
        backend
            .sign_responses
            .lock()
            .expect("lock")
            .push_back(Err(SdkError::Network("signer offline".to_string())));
        let queue = Arc::new(MockQueue::default());
        let reconciler = reconciler(backend.clone(), queue.clone(), OfferSigningSupport::Supported);

        let result = reconciler
            .make_purchase(&manager(backend.clone()), &product(true))
            .await;
        assert!(matches!(result, Err(SdkError::DiscountSigningFailed(_))));
        assert_eq!(queue.submit_calls.load(Ordering::SeqCst), 0);
        assert!(!reconciler.is_reconciling());
    }

    #[tokio::test]
    async fn unsupported_signing_submits_without_a_signature() {
        let backend = Arc::new(MockBackend::default());
        backend.push_profile(Ok(FetchedValue::New(VersionedValue::new(
            profile("profile-1"),
            "h1",
        ))));
        let queue = Arc::new(MockQueue::default());
        let reconciler =
            reconciler(backend.clone(), queue.clone(), OfferSigningSupport::Unsupported);

        reconciler
            .make_purchase(&manager(backend.clone()), &product(true))
            .await
            .expect("purchase");
        assert_eq!(backend.sign_calls.load(Ordering::SeqCst), 0);
        let payments = queue.submitted_payments.lock().expect("lock");
        assert!(payments[0].offer_signature.is_none());
    }

    #[tokio::test]
    async fn successful_purchase_signs_tags_and_refreshes() {
        let backend = Arc::new(MockBackend::default());
        backend.sign_responses.lock().expect("lock").push_back(Ok(signature()));
        backend.push_profile(Ok(FetchedValue::New(VersionedValue::new(
            profile("profile-1"),
            "h1",
        ))));
        let queue = Arc::new(MockQueue::default());
        let reconciler = reconciler(backend.clone(), queue.clone(), OfferSigningSupport::Supported);

        let refreshed = reconciler
            .make_purchase(&manager(backend.clone()), &product(true))
            .await
            .expect("purchase");
        assert_eq!(refreshed.profile_id, "profile-1");
        assert_eq!(backend.variation_calls.load(Ordering::SeqCst), 1);
        let payments = queue.submitted_payments.lock().expect("lock");
        assert!(payments[0].offer_signature.is_some());
        assert!(!reconciler.is_reconciling());
    }

    #[tokio::test]
    async fn queue_failure_surfaces_and_clears_pending_state() {
        let backend = Arc::new(MockBackend::default());
        let queue = Arc::new(MockQueue::default());
        *queue.submit_failure.lock().expect("lock") =
            Some(SdkError::PlatformTransaction("cancelled".to_string()));
        let reconciler = reconciler(backend.clone(), queue, OfferSigningSupport::Supported);

        let result = reconciler
            .make_purchase(&manager(backend.clone()), &product(false))
            .await;
        assert_eq!(
            result,
            Err(SdkError::PlatformTransaction("cancelled".to_string()))
        );
        assert!(!reconciler.is_reconciling());
        assert_eq!(backend.variation_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn variation_tag_failure_still_settles_the_purchase() {
        let backend = Arc::new(MockBackend::default());
        backend
            .variation_responses
            .lock()
            .expect("lock")
            .push_back(Err(SdkError::Network("offline".to_string())));
        backend.push_profile(Ok(FetchedValue::New(VersionedValue::new(
            profile("profile-1"),
            "h1",
        ))));
        let queue = Arc::new(MockQueue::default());
        let reconciler = reconciler(backend.clone(), queue, OfferSigningSupport::Unsupported);

        let refreshed = reconciler
            .make_purchase(&manager(backend.clone()), &product(false))
            .await
            .expect("purchase survives tagging failure");
        assert_eq!(refreshed.profile_id, "profile-1");
    }

    #[tokio::test]
    async fn restore_replays_history_and_refreshes_the_profile() {
        let backend = Arc::new(MockBackend::default());
        backend.push_profile(Ok(FetchedValue::New(VersionedValue::new(
            profile("profile-1"),
            "h1",
        ))));
        let queue = Arc::new(MockQueue::default());
        queue
            .restorable
            .lock()
            .expect("lock")
            .push(SettledTransaction {
                transaction_id: "txn-old".to_string(),
                vendor_product_id: "product-1".to_string(),
            });
        let reconciler = reconciler(backend.clone(), queue, OfferSigningSupport::Supported);

        let refreshed = reconciler
            .restore_purchases(&manager(backend.clone()))
            .await
            .expect("restore");
        assert_eq!(refreshed.profile_id, "profile-1");
        assert_eq!(backend.fetch_profile_calls.load(Ordering::SeqCst), 1);
    }
}
