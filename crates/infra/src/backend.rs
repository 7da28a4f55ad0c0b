use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::time::sleep;

use langgan_domain::SdkResult;
use langgan_domain::error::SdkError;
use langgan_domain::paywall::{IntroductoryOfferEligibility, Paywall};
use langgan_domain::ports::BoxFuture;
use langgan_domain::ports::backend::{Backend, OfferSignature};
use langgan_domain::profile::{Profile, ProfileParameters};
use langgan_domain::versioned::{FetchedValue, VersionedValue};

use crate::config::SdkConfig;

const API_KEY_HEADER: &str = "X-Api-Key";
const RESPONSE_HASH_HEADER: &str = "x-response-hash";
const PREVIOUS_HASH_HEADER: &str = "x-previous-response-hash";

/// Envelope every backend payload arrives in.
#[derive(Debug, Deserialize)]
struct ResponseBody<T> {
    data: T,
}

/// HTTP implementation of the backend port. Reads are hash-conditional: the
/// cached value's hash travels up in a request header and a matching server
/// hash (or a 304) comes back as `NotModified` with no body to decode.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry_max_attempts: u32,
    retry_backoff_base: Duration,
    retry_backoff_max: Duration,
}

impl HttpBackend {
    pub fn from_config(config: &SdkConfig) -> Self {
        let timeout = Duration::from_millis(config.backend_timeout_ms.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: config.backend_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry_max_attempts: config.backend_retry_max_attempts.max(1),
            retry_backoff_base: Duration::from_millis(config.backend_retry_backoff_base_ms),
            retry_backoff_max: Duration::from_millis(config.backend_retry_backoff_max_ms),
        }
    }

    async fn get_conditional<T: DeserializeOwned>(
        &self,
        path: &str,
        query_params: &[(String, String)],
        previous_hash: Option<&str>,
    ) -> SdkResult<FetchedValue<T>> {
        let attempts = self.retry_max_attempts.max(1);
        let url = endpoint_url(&self.base_url, path);

        for attempt in 0..attempts {
            let mut request = self
                .http
                .get(&url)
                .header("accept", "application/json")
                .header(API_KEY_HEADER, &self.api_key);
            if !query_params.is_empty() {
                request = request.query(query_params);
            }
            if let Some(hash) = previous_hash {
                request = request.header(PREVIOUS_HASH_HEADER, hash);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt + 1 < attempts {
                        sleep(backoff_for_attempt(
                            self.retry_backoff_base,
                            self.retry_backoff_max,
                            attempt,
                        ))
                        .await;
                        continue;
                    }
                    return Err(SdkError::Network(err.to_string()));
                }
            };

            let status = response.status();
            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchedValue::NotModified);
            }
            if status.is_success() {
                let hash = response_hash(&response);
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| SdkError::Network(err.to_string()))?;
                // Older backends omit the hash header; digesting the body
                // gives change detection the same property either way.
                let hash = hash.unwrap_or_else(|| body_digest(&body));
                if previous_hash == Some(hash.as_str()) {
                    return Ok(FetchedValue::NotModified);
                }
                let decoded: ResponseBody<T> = serde_json::from_slice(&body)
                    .map_err(|err| SdkError::Decoding(err.to_string()))?;
                return Ok(FetchedValue::New(VersionedValue::new(decoded.data, hash)));
            }

            if retryable_status(status) && attempt + 1 < attempts {
                sleep(backoff_for_attempt(
                    self.retry_backoff_base,
                    self.retry_backoff_max,
                    attempt,
                ))
                .await;
                continue;
            }
            let message = response.text().await.unwrap_or_default();
            return Err(SdkError::Network(format!(
                "status {}: {}",
                status.as_u16(),
                message
            )));
        }

        Err(SdkError::Network("retry loop exited unexpectedly".to_string()))
    }

    async fn write_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: &Value,
    ) -> SdkResult<VersionedValue<T>> {
        let body = self.write_raw(method, path, payload).await?;
        let hash = body_digest(&body);
        let decoded: ResponseBody<T> =
            serde_json::from_slice(&body).map_err(|err| SdkError::Decoding(err.to_string()))?;
        Ok(VersionedValue::new(decoded.data, hash))
    }

    async fn write_raw(
        &self,
        method: Method,
        path: &str,
        payload: &Value,
    ) -> SdkResult<Vec<u8>> {
        let attempts = self.retry_max_attempts.max(1);
        let url = endpoint_url(&self.base_url, path);

        for attempt in 0..attempts {
            let request = self
                .http
                .request(method.clone(), &url)
                .header("accept", "application/json")
                .header(API_KEY_HEADER, &self.api_key)
                .json(payload);

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt + 1 < attempts {
                        sleep(backoff_for_attempt(
                            self.retry_backoff_base,
                            self.retry_backoff_max,
                            attempt,
                        ))
                        .await;
                        continue;
                    }
                    return Err(SdkError::Network(err.to_string()));
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| SdkError::Network(err.to_string()))?;
                return Ok(body.to_vec());
            }

            if retryable_status(status) && attempt + 1 < attempts {
                sleep(backoff_for_attempt(
                    self.retry_backoff_base,
                    self.retry_backoff_max,
                    attempt,
                ))
                .await;
                continue;
            }
            let message = response.text().await.unwrap_or_default();
            return Err(SdkError::Network(format!(
                "status {}: {}",
                status.as_u16(),
                message
            )));
        }

        Err(SdkError::Network("retry loop exited unexpectedly".to_string()))
    }
}

impl Backend for HttpBackend {
    fn fetch_profile(
        &self,
        profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Profile>>> {
        let path = format!("profiles/{profile_id}");
        let hash = response_hash.map(ToOwned::to_owned);
        Box::pin(async move { self.get_conditional(&path, &[], hash.as_deref()).await })
    }

    fn create_profile(
        &self,
        profile_id: &str,
        customer_user_id: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>> {
        let path = format!("profiles/{profile_id}");
        let payload = json!({ "customer_user_id": customer_user_id });
        Box::pin(async move { self.write_json(Method::POST, &path, &payload).await })
    }

    fn update_profile(
        &self,
        profile_id: &str,
        params: &ProfileParameters,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>> {
        let path = format!("profiles/{profile_id}/attributes");
        let payload = json!({ "attributes": params });
        Box::pin(async move { self.write_json(Method::PATCH, &path, &payload).await })
    }

    fn set_variation_id(
        &self,
        profile_id: &str,
        transaction_id: &str,
        variation_id: &str,
    ) -> BoxFuture<'_, SdkResult<()>> {
        let path = format!("profiles/{profile_id}/transactions/{transaction_id}/variation");
        let payload = json!({ "variation_id": variation_id });
        Box::pin(async move {
            self.write_raw(Method::POST, &path, &payload).await?;
            Ok(())
        })
    }

    fn fetch_paywall(
        &self,
        paywall_id: &str,
        profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Paywall>>> {
        let path = format!("paywalls/{paywall_id}");
        let query = vec![("profile_id".to_string(), profile_id.to_string())];
        let hash = response_hash.map(ToOwned::to_owned);
        Box::pin(async move { self.get_conditional(&path, &query, hash.as_deref()).await })
    }

    fn sign_subscription_offer(
        &self,
        profile_id: &str,
        vendor_product_id: &str,
        discount_id: &str,
    ) -> BoxFuture<'_, SdkResult<OfferSignature>> {
        let path = format!("profiles/{profile_id}/promotional-offers/sign");
        let payload = json!({
            "vendor_product_id": vendor_product_id,
            "discount_id": discount_id,
        });
        Box::pin(async move {
            let signed: VersionedValue<OfferSignature> =
                self.write_json(Method::POST, &path, &payload).await?;
            Ok(signed.value)
        })
    }

    fn introductory_eligibility(
        &self,
        profile_id: &str,
        product_ids: &[String],
    ) -> BoxFuture<'_, SdkResult<HashMap<String, IntroductoryOfferEligibility>>> {
        let path = format!("profiles/{profile_id}/receipt/eligibility");
        let payload = json!({ "product_ids": product_ids });
        Box::pin(async move {
            let resolved: VersionedValue<HashMap<String, IntroductoryOfferEligibility>> =
                self.write_json(Method::POST, &path, &payload).await?;
            Ok(resolved.value)
        })
    }
}

fn response_hash(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(RESPONSE_HASH_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

fn body_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff_for_attempt(base: Duration, max: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::from_millis(1);
    }
    let multiplier = 1u64 << attempt.min(8);
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(multiplier).max(1);
    if max_ms == 0 {
        Duration::from_millis(delay_ms)
    } else {
        Duration::from_millis(delay_ms.min(max_ms))
    }
}
