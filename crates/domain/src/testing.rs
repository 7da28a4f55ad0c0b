//! Shared in-memory test doubles for the collaborator ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::SdkResult;
use crate::error::SdkError;
use crate::paywall::{IntroductoryOfferEligibility, Paywall, ProductDescriptor};
use crate::ports::BoxFuture;
use crate::ports::backend::{Backend, OfferSignature};
use crate::ports::catalog::ProductCatalog;
use crate::ports::purchases::{PaymentRequest, PurchaseContext, PurchaseQueue, SettledTransaction};
use crate::ports::store::{DurableStore, StoreError};
use crate::profile::{Profile, ProfileParameters};
use crate::versioned::{FetchedValue, VersionedValue};

#[derive(Debug, Default)]
pub(crate) struct MemStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    pub(crate) fn seed(&self, key: &str, bytes: Vec<u8>) {
        self.inner
            .lock()
            .expect("mem store lock")
            .insert(key.to_string(), bytes);
    }

    pub(crate) fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().expect("mem store lock").get(key).cloned()
    }
}

impl DurableStore for MemStore {
    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.inner.lock().expect("mem store lock").insert(key, bytes);
            Ok(())
        })
    }

    fn get_bytes(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.inner.lock().expect("mem store lock").get(&key).cloned()) })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.inner.lock().expect("mem store lock").remove(&key);
            Ok(())
        })
    }
}

/// A store whose every operation fails, for exercising the logged-and-ignored
/// persistence path.
#[derive(Debug, Default)]
pub(crate) struct FailingStore;

impl DurableStore for FailingStore {
    fn set_bytes(&self, _key: &str, _bytes: Vec<u8>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Err(StoreError::Io("disk full".to_string())) })
    }

    fn get_bytes(&self, _key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        Box::pin(async { Err(StoreError::Io("disk full".to_string())) })
    }

    fn remove(&self, _key: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Err(StoreError::Io("disk full".to_string())) })
    }
}

/// Scripted backend: each call pops the next queued response for its
/// operation; an unscripted call fails loudly so tests never pass by
/// accident. Call counts and the hashes the SDK sent are recorded.
#[derive(Default)]
pub(crate) struct MockBackend {
    pub profile_responses: Mutex<VecDeque<SdkResult<FetchedValue<Profile>>>>,
    pub fetch_profile_calls: AtomicUsize,
    pub sent_profile_hashes: Mutex<Vec<Option<String>>>,
    pub create_responses: Mutex<VecDeque<SdkResult<VersionedValue<Profile>>>>,
    pub create_calls: AtomicUsize,
    pub update_responses: Mutex<VecDeque<SdkResult<VersionedValue<Profile>>>>,
    pub update_calls: AtomicUsize,
    pub variation_responses: Mutex<VecDeque<SdkResult<()>>>,
    pub variation_calls: AtomicUsize,
    pub paywall_responses: Mutex<VecDeque<SdkResult<FetchedValue<Paywall>>>>,
    pub fetch_paywall_calls: AtomicUsize,
    pub sent_paywall_hashes: Mutex<Vec<Option<String>>>,
    pub sign_responses: Mutex<VecDeque<SdkResult<OfferSignature>>>,
    pub sign_calls: AtomicUsize,
    pub eligibility_responses:
        Mutex<VecDeque<SdkResult<HashMap<String, IntroductoryOfferEligibility>>>>,
    pub eligibility_calls: AtomicUsize,
    /// Simulated latency on paywall fetches, for single-flight tests.
    pub paywall_delay: Option<Duration>,
}

fn unscripted<T>(operation: &str) -> SdkResult<T> {
    Err(SdkError::Network(format!("unscripted mock call: {operation}")))
}

fn pop<T>(queue: &Mutex<VecDeque<SdkResult<T>>>, operation: &str) -> SdkResult<T> {
    queue
        .lock()
        .expect("mock backend lock")
        .pop_front()
        .unwrap_or_else(|| unscripted(operation))
}

impl MockBackend {
    pub(crate) fn push_profile(&self, response: SdkResult<FetchedValue<Profile>>) {
        self.profile_responses
            .lock()
            .expect("mock backend lock")
            .push_back(response);
    }

    pub(crate) fn push_paywall(&self, response: SdkResult<FetchedValue<Paywall>>) {
        self.paywall_responses
            .lock()
            .expect("mock backend lock")
            .push_back(response);
    }
}

impl Backend for MockBackend {
    fn fetch_profile(
        &self,
        _profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Profile>>> {
        let hash = response_hash.map(ToOwned::to_owned);
        Box::pin(async move {
            self.fetch_profile_calls.fetch_add(1, Ordering::SeqCst);
            self.sent_profile_hashes
                .lock()
                .expect("mock backend lock")
                .push(hash);
            pop(&self.profile_responses, "fetch_profile")
        })
    }

    fn create_profile(
        &self,
        profile_id: &str,
        customer_user_id: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>> {
        let profile_id = profile_id.to_string();
        let customer_user_id = customer_user_id.map(ToOwned::to_owned);
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self
                .create_responses
                .lock()
                .expect("mock backend lock")
                .pop_front();
            match scripted {
                Some(response) => response,
                None => Ok(VersionedValue::new(
                    Profile {
                        profile_id,
                        customer_user_id,
                        ..Profile::default()
                    },
                    "created-hash",
                )),
            }
        })
    }

    fn update_profile(
        &self,
        _profile_id: &str,
        _params: &ProfileParameters,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>> {
        Box::pin(async move {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.update_responses, "update_profile")
        })
    }

    fn set_variation_id(
        &self,
        _profile_id: &str,
        _transaction_id: &str,
        _variation_id: &str,
    ) -> BoxFuture<'_, SdkResult<()>> {
        Box::pin(async move {
            self.variation_calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self
                .variation_responses
                .lock()
                .expect("mock backend lock")
                .pop_front();
            scripted.unwrap_or(Ok(()))
        })
    }

    fn fetch_paywall(
        &self,
        _paywall_id: &str,
        _profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Paywall>>> {
        let hash = response_hash.map(ToOwned::to_owned);
        Box::pin(async move {
            self.fetch_paywall_calls.fetch_add(1, Ordering::SeqCst);
            self.sent_paywall_hashes
                .lock()
                .expect("mock backend lock")
                .push(hash);
            if let Some(delay) = self.paywall_delay {
                tokio::time::sleep(delay).await;
            }
            pop(&self.paywall_responses, "fetch_paywall")
        })
    }

    fn sign_subscription_offer(
        &self,
        _profile_id: &str,
        _vendor_product_id: &str,
        _discount_id: &str,
    ) -> BoxFuture<'_, SdkResult<OfferSignature>> {
        Box::pin(async move {
            self.sign_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.sign_responses, "sign_subscription_offer")
        })
    }

    fn introductory_eligibility(
        &self,
        _profile_id: &str,
        _product_ids: &[String],
    ) -> BoxFuture<'_, SdkResult<HashMap<String, IntroductoryOfferEligibility>>> {
        Box::pin(async move {
            self.eligibility_calls.fetch_add(1, Ordering::SeqCst);
            pop(&self.eligibility_responses, "introductory_eligibility")
        })
    }
}

/// Purchase queue double: settles every submission with a sequential
/// transaction id and records what was submitted.
pub(crate) struct MockQueue {
    pub transactable: bool,
    pub submit_calls: AtomicUsize,
    pub submitted_payments: Mutex<Vec<PaymentRequest>>,
    pub submit_failure: Mutex<Option<SdkError>>,
    pub restorable: Mutex<Vec<SettledTransaction>>,
}

impl Default for MockQueue {
    fn default() -> Self {
        Self {
            transactable: true,
            submit_calls: AtomicUsize::new(0),
            submitted_payments: Mutex::new(Vec::new()),
            submit_failure: Mutex::new(None),
            restorable: Mutex::new(Vec::new()),
        }
    }
}

impl PurchaseQueue for MockQueue {
    fn can_transact(&self) -> bool {
        self.transactable
    }

    fn submit(
        &self,
        payment: PaymentRequest,
        _context: PurchaseContext,
    ) -> BoxFuture<'_, SdkResult<SettledTransaction>> {
        Box::pin(async move {
            let serial = self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.submit_failure.lock().expect("mock queue lock").clone() {
                return Err(failure);
            }
            let vendor_product_id = payment.vendor_product_id.clone();
            self.submitted_payments
                .lock()
                .expect("mock queue lock")
                .push(payment);
            Ok(SettledTransaction {
                transaction_id: format!("txn-{serial}"),
                vendor_product_id,
            })
        })
    }

    fn restore_all(&self) -> BoxFuture<'_, SdkResult<Vec<SettledTransaction>>> {
        Box::pin(async move { Ok(self.restorable.lock().expect("mock queue lock").clone()) })
    }
}

/// Catalog double that resolves every requested id to a bare descriptor.
#[derive(Default)]
pub(crate) struct MockCatalog {
    pub with_promo: bool,
}

impl ProductCatalog for MockCatalog {
    fn products(&self, product_ids: &[String]) -> BoxFuture<'_, SdkResult<Vec<ProductDescriptor>>> {
        let ids = product_ids.to_vec();
        Box::pin(async move {
            Ok(ids
                .into_iter()
                .map(|id| descriptor(&id, self.with_promo))
                .collect())
        })
    }
}

pub(crate) fn descriptor(vendor_product_id: &str, with_promo: bool) -> ProductDescriptor {
    use crate::paywall::{PaymentMode, PeriodUnit, ProductDiscount, SubscriptionPeriod};
    ProductDescriptor {
        vendor_product_id: vendor_product_id.to_string(),
        localized_title: format!("{vendor_product_id} title"),
        price: 9.99,
        currency_code: Some("USD".to_string()),
        localized_price: Some("$9.99".to_string()),
        subscription_period: Some(SubscriptionPeriod {
            unit: PeriodUnit::Month,
            number_of_units: 1,
        }),
        introductory_discount: None,
        discounts: if with_promo {
            vec![ProductDiscount {
                identifier: Some(format!("{vendor_product_id}.promo")),
                price: 4.99,
                number_of_periods: 3,
                payment_mode: PaymentMode::PayAsYouGo,
                subscription_period: SubscriptionPeriod {
                    unit: PeriodUnit::Month,
                    number_of_units: 1,
                },
                localized_price: Some("$4.99".to_string()),
                localized_subscription_period: None,
            }]
        } else {
            Vec::new()
        },
    }
}

pub(crate) fn profile(profile_id: &str) -> Profile {
    Profile {
        profile_id: profile_id.to_string(),
        ..Profile::default()
    }
}

pub(crate) fn paywall(paywall_id: &str, variation_id: &str, product_ids: &[&str]) -> Paywall {
    Paywall {
        paywall_id: paywall_id.to_string(),
        variation_id: variation_id.to_string(),
        revision: 1,
        ab_test_name: None,
        product_ids: product_ids.iter().map(|id| (*id).to_string()).collect(),
        payload: None,
    }
}

pub(crate) fn signature() -> OfferSignature {
    OfferSignature {
        key_identifier: "key-1".to_string(),
        nonce: "nonce-1".to_string(),
        signature: "c2lnbmF0dXJl".to_string(),
        timestamp_ms: 1_700_000_000_000,
    }
}
