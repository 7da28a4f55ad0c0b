use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::SdkResult;
use crate::cache::ObjectCache;
use crate::error::SdkError;
use crate::ports::backend::Backend;
use crate::profile::{Profile, ProfileParameters};
use crate::single_flight::SingleFlight;
use crate::versioned::{FetchedValue, VersionedValue};

fn profile_cache_key(profile_id: &str) -> String {
    format!("profile.{profile_id}")
}

/// Owns the authoritative local Profile for one profile identity and is the
/// only writer to its cache slot. Fetch-or-mutate operations against the same
/// identity are collapsed through a single-flight per cache key.
#[derive(Clone)]
pub struct ProfileManager {
    profile_id: String,
    backend: Arc<dyn Backend>,
    cache: ObjectCache,
    fetches: SingleFlight<SdkResult<Profile>>,
    acknowledged_variations: Arc<Mutex<HashMap<String, String>>>,
}

impl ProfileManager {
    pub fn new(profile_id: impl Into<String>, backend: Arc<dyn Backend>, cache: ObjectCache) -> Self {
        Self {
            profile_id: profile_id.into(),
            backend,
            cache,
            fetches: SingleFlight::new(),
            acknowledged_variations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Constructs the manager for a brand-new identity: the server-side
    /// profile is created first and becomes the initial cache entry. Nothing
    /// is written locally if creation fails.
    pub async fn bootstrap(
        profile_id: String,
        customer_user_id: Option<String>,
        backend: Arc<dyn Backend>,
        cache: ObjectCache,
    ) -> SdkResult<Self> {
        let manager = Self::new(profile_id, backend, cache);
        let created = manager
            .backend
            .create_profile(&manager.profile_id, customer_user_id.as_deref())
            .await?;
        manager.cache.put(&manager.cache_key(), &created).await;
        Ok(manager)
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    fn cache_key(&self) -> String {
        profile_cache_key(&self.profile_id)
    }

    pub async fn cached_profile(&self) -> Option<VersionedValue<Profile>> {
        self.cache.get(&self.cache_key()).await
    }

    /// Returns the freshest Profile available. With a cache: conditional
    /// refresh, falling back to the cached value on transient failure. Without
    /// one: suspends until a fetch resolves and surfaces its failure.
    pub async fn get_profile(&self) -> SdkResult<Profile> {
        let key = self.cache_key();
        let this = self.clone();
        self.fetches
            .run(&key, || async move { this.fetch_or_fallback().await })
            .await
    }

    async fn fetch_or_fallback(&self) -> SdkResult<Profile> {
        let key = self.cache_key();
        let cached: Option<VersionedValue<Profile>> = self.cache.get(&key).await;
        let hash = cached.as_ref().map(|vv| vv.hash.clone());
        match self
            .backend
            .fetch_profile(&self.profile_id, hash.as_deref())
            .await
        {
            Ok(FetchedValue::NotModified) => match cached {
                Some(vv) => Ok(vv.value),
                // The server confirmed a hash we never sent; refetch plain.
                None => match self.backend.fetch_profile(&self.profile_id, None).await? {
                    FetchedValue::New(vv) => {
                        self.cache.put(&key, &vv).await;
                        Ok(vv.value)
                    }
                    FetchedValue::NotModified => Err(SdkError::Decoding(
                        "hash match reported for an unconditional request".to_string(),
                    )),
                },
            },
            Ok(FetchedValue::New(vv)) => {
                self.cache.put(&key, &vv).await;
                Ok(vv.value)
            }
            Err(err @ (SdkError::Network(_) | SdkError::Decoding(_))) => match cached {
                Some(vv) => {
                    tracing::warn!(error = %err, "profile refresh failed, serving cached profile");
                    Ok(vv.value)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Submits attribute changes to the backend. On success the cached
    /// Profile is replaced wholesale, keyed by the response's own hash; on
    /// failure the cache is left in its last-known-good state.
    pub async fn update_profile(&self, params: &ProfileParameters) -> SdkResult<Profile> {
        let updated = self.backend.update_profile(&self.profile_id, params).await?;
        self.cache.put(&self.cache_key(), &updated).await;
        Ok(updated.value)
    }

    /// Tags a platform transaction with the paywall variation that produced
    /// it. Repeating an already-acknowledged pair is a no-op success.
    pub async fn set_variation_id(&self, variation_id: &str, transaction_id: &str) -> SdkResult<()> {
        {
            let acknowledged = self.acknowledged_variations.lock().await;
            if acknowledged.get(transaction_id).map(String::as_str) == Some(variation_id) {
                return Ok(());
            }
        }
        self.backend
            .set_variation_id(&self.profile_id, transaction_id, variation_id)
            .await?;
        self.acknowledged_variations
            .lock()
            .await
            .insert(transaction_id.to_string(), variation_id.to_string());
        Ok(())
    }

    /// Discards this identity's cache slot. Called when the identity is
    /// switched away from.
    pub async fn clear_cache(&self) {
        self.cache.clear(&self.cache_key()).await;
    }
}
