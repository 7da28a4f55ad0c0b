use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock};

use langgan_domain::SdkResult;
use langgan_domain::cache::ObjectCache;
use langgan_domain::error::SdkError;
use langgan_domain::paywall::{Paywall, PaywallProduct, ProductsFetchPolicy};
use langgan_domain::paywalls::PaywallResolver;
use langgan_domain::ports::backend::Backend;
use langgan_domain::ports::catalog::ProductCatalog;
use langgan_domain::ports::purchases::{OfferSigningSupport, PurchaseQueue};
use langgan_domain::ports::store::DurableStore;
use langgan_domain::profile::{Profile, ProfileParameters};
use langgan_domain::profiles::ProfileManager;
use langgan_domain::purchases::PurchaseReconciler;
use langgan_domain::util::uuid_v7_without_dashes;

/// At most one activated client per process.
static ACTIVATED: AtomicBool = AtomicBool::new(false);

const PROFILE_ID_KEY: &str = "profile_id";
const ANALYTICS_DISABLED_KEY: &str = "analytics_disabled";

/// Platform and transport implementations the client is assembled from.
pub struct Collaborators {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn DurableStore>,
    pub queue: Arc<dyn PurchaseQueue>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub offer_signing: OfferSigningSupport,
}

impl Collaborators {
    /// Wires the HTTP backend and file-backed store from configuration. The
    /// purchase queue, product catalog, and offer-signing capability are
    /// platform-specific and stay host-supplied.
    pub fn from_config(
        config: &langgan_infra::config::SdkConfig,
        queue: Arc<dyn PurchaseQueue>,
        catalog: Arc<dyn ProductCatalog>,
        offer_signing: OfferSigningSupport,
    ) -> Self {
        Self {
            backend: Arc::new(langgan_infra::backend::HttpBackend::from_config(config)),
            store: Arc::new(langgan_infra::storage::FileStore::new(
                config.cache_dir.clone(),
            )),
            queue,
            catalog,
            offer_signing,
        }
    }
}

/// The managers scoped to the current profile identity. Replaced wholesale on
/// identify/logout.
#[derive(Clone)]
struct Session {
    profiles: Arc<ProfileManager>,
    paywalls: Arc<PaywallResolver>,
}

struct ClientInner {
    backend: Arc<dyn Backend>,
    catalog: Arc<dyn ProductCatalog>,
    store: Arc<dyn DurableStore>,
    cache: ObjectCache,
    reconciler: PurchaseReconciler,
    /// Purchases hold this shared; identity switches take it exclusively.
    identity_gate: Arc<RwLock<()>>,
    session: RwLock<Option<Session>>,
    /// Serializes identify/logout against each other.
    switches: Mutex<()>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Activates the SDK for this process. A second activation fails until
    /// [`Client::deactivate`] runs; a failed session start releases the
    /// activation slot so the caller can retry.
    pub async fn activate(
        collaborators: Collaborators,
        customer_user_id: Option<&str>,
    ) -> SdkResult<Self> {
        if ACTIVATED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyActivated);
        }
        let client = Self::assemble(collaborators);
        if let Err(err) = client.start_session(customer_user_id).await {
            ACTIVATED.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(client)
    }

    pub async fn deactivate(&self) {
        *self.inner.session.write().await = None;
        ACTIVATED.store(false, Ordering::SeqCst);
    }

    pub(crate) fn assemble(collaborators: Collaborators) -> Self {
        let identity_gate = Arc::new(RwLock::new(()));
        let cache = ObjectCache::new(collaborators.store.clone());
        let reconciler = PurchaseReconciler::new(
            collaborators.backend.clone(),
            collaborators.queue,
            collaborators.offer_signing,
            identity_gate.clone(),
        );
        Self {
            inner: Arc::new(ClientInner {
                backend: collaborators.backend,
                catalog: collaborators.catalog,
                store: collaborators.store,
                cache,
                reconciler,
                identity_gate,
                session: RwLock::new(None),
                switches: Mutex::new(()),
            }),
        }
    }

    /// Restores the persisted profile identity, or creates one on first
    /// launch. If a customer user id is supplied for a restored identity that
    /// belongs to someone else, the startup folds into an identify.
    pub(crate) async fn start_session(&self, customer_user_id: Option<&str>) -> SdkResult<()> {
        let persisted = match self.inner.store.get_bytes(PROFILE_ID_KEY).await {
            Ok(bytes) => bytes.and_then(|bytes| String::from_utf8(bytes).ok()),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read persisted profile id");
                None
            }
        };

        match persisted {
            Some(profile_id) => {
                let profiles =
                    ProfileManager::new(profile_id, self.inner.backend.clone(), self.inner.cache.clone());
                self.install_session(profiles).await;
                if let Some(customer_user_id) = customer_user_id {
                    self.identify(customer_user_id).await?;
                }
            }
            None => {
                let profile_id = uuid_v7_without_dashes();
                let profiles = ProfileManager::bootstrap(
                    profile_id.clone(),
                    customer_user_id.map(ToOwned::to_owned),
                    self.inner.backend.clone(),
                    self.inner.cache.clone(),
                )
                .await?;
                self.persist_profile_id(&profile_id).await;
                self.install_session(profiles).await;
            }
        }
        Ok(())
    }

    async fn install_session(&self, profiles: ProfileManager) {
        let paywalls = PaywallResolver::new(
            profiles.profile_id(),
            self.inner.backend.clone(),
            self.inner.catalog.clone(),
            self.inner.cache.clone(),
        );
        *self.inner.session.write().await = Some(Session {
            profiles: Arc::new(profiles),
            paywalls: Arc::new(paywalls),
        });
    }

    async fn persist_profile_id(&self, profile_id: &str) {
        if let Err(err) = self
            .inner
            .store
            .set_bytes(PROFILE_ID_KEY, profile_id.as_bytes().to_vec())
            .await
        {
            tracing::warn!(error = %err, "failed to persist profile id");
        }
    }

    /// Distinguishes a client that was never activated (or was deactivated)
    /// from one whose identity is being switched right now: the former is
    /// permanent, the latter clears as soon as the switch lands.
    fn session(&self) -> SdkResult<Session> {
        match self.inner.session.try_read() {
            Ok(slot) => slot.clone().ok_or(SdkError::NotActivated),
            Err(_) => Err(SdkError::ManagerUnavailable),
        }
    }

    pub async fn get_profile(&self) -> SdkResult<Profile> {
        let session = self.session()?;
        session.profiles.get_profile().await
    }

    /// Applies attribute changes. The analytics consent flag is device-local:
    /// it is persisted before the network round trip and kept even when that
    /// round trip fails.
    pub async fn update_profile(&self, params: &ProfileParameters) -> SdkResult<()> {
        if let Some(disabled) = params.analytics_disabled
            && let Err(err) = self
                .inner
                .store
                .set_bytes(ANALYTICS_DISABLED_KEY, vec![u8::from(disabled)])
                .await
        {
            tracing::warn!(error = %err, "failed to persist analytics consent flag");
        }
        if !params.has_remote_changes() {
            return Ok(());
        }
        let session = self.session()?;
        session.profiles.update_profile(params).await?;
        Ok(())
    }

    pub async fn analytics_disabled(&self) -> bool {
        match self.inner.store.get_bytes(ANALYTICS_DISABLED_KEY).await {
            Ok(Some(bytes)) => bytes.first().copied() == Some(1),
            _ => false,
        }
    }

    /// Tags a platform transaction with the paywall variation it came from.
    pub async fn set_variation_id(
        &self,
        variation_id: &str,
        transaction_id: &str,
    ) -> SdkResult<()> {
        let session = self.session()?;
        session
            .profiles
            .set_variation_id(variation_id, transaction_id)
            .await
    }

    pub async fn get_paywall(&self, paywall_id: &str) -> SdkResult<Paywall> {
        let session = self.session()?;
        session.paywalls.get_paywall(paywall_id).await
    }

    pub async fn get_paywall_products(
        &self,
        paywall: &Paywall,
        fetch_policy: ProductsFetchPolicy,
    ) -> SdkResult<Vec<PaywallProduct>> {
        let session = self.session()?;
        session
            .paywalls
            .get_paywall_products(paywall, fetch_policy)
            .await
    }

    /// Any identity switch already in flight finishes first, so the purchase
    /// reconciles against the profile that will actually own it.
    pub async fn make_purchase(&self, product: &PaywallProduct) -> SdkResult<Profile> {
        let _identity = self.inner.identity_gate.read().await;
        let session = self.session()?;
        self.inner
            .reconciler
            .make_purchase(&session.profiles, product)
            .await
    }

    pub async fn restore_purchases(&self) -> SdkResult<Profile> {
        let _identity = self.inner.identity_gate.read().await;
        let session = self.session()?;
        self.inner
            .reconciler
            .restore_purchases(&session.profiles)
            .await
    }

    /// Binds the device to a customer account. Identifying as the account the
    /// current profile already belongs to is a no-op; otherwise a fresh
    /// profile identity replaces the current one and its caches.
    pub async fn identify(&self, customer_user_id: &str) -> SdkResult<()> {
        let _switching = self.inner.switches.lock().await;
        let session = self.session()?;
        if let Some(cached) = session.profiles.cached_profile().await
            && cached.value.customer_user_id.as_deref() == Some(customer_user_id)
        {
            return Ok(());
        }
        let _exclusive = self.inner.identity_gate.try_write().map_err(|_| {
            SdkError::IdentityConflict("purchase reconciliation in flight".to_string())
        })?;
        self.switch_identity(Some(customer_user_id)).await
    }

    /// Detaches the device from its customer account and starts over with an
    /// anonymous profile identity.
    pub async fn logout(&self) -> SdkResult<()> {
        let _switching = self.inner.switches.lock().await;
        self.session()?;
        let _exclusive = self.inner.identity_gate.try_write().map_err(|_| {
            SdkError::IdentityConflict("purchase reconciliation in flight".to_string())
        })?;
        self.switch_identity(None).await
    }

    /// The new identity is bootstrapped before the old one is torn down, so a
    /// failed switch leaves the current session untouched. The session slot is
    /// held exclusively for the whole switch: concurrent callers see
    /// [`SdkError::ManagerUnavailable`] instead of the outgoing identity.
    async fn switch_identity(&self, customer_user_id: Option<&str>) -> SdkResult<()> {
        let mut slot = self.inner.session.write().await;
        let profile_id = uuid_v7_without_dashes();
        let profiles = ProfileManager::bootstrap(
            profile_id.clone(),
            customer_user_id.map(ToOwned::to_owned),
            self.inner.backend.clone(),
            self.inner.cache.clone(),
        )
        .await?;
        self.persist_profile_id(&profile_id).await;

        let paywalls = PaywallResolver::new(
            profiles.profile_id(),
            self.inner.backend.clone(),
            self.inner.catalog.clone(),
            self.inner.cache.clone(),
        );
        if let Some(old) = slot.take() {
            old.profiles.clear_cache().await;
            old.paywalls.clear_cached_paywalls().await;
        }
        *slot = Some(Session {
            profiles: Arc::new(profiles),
            paywalls: Arc::new(paywalls),
        });
        Ok(())
    }
}
