use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::BoxFuture;
use crate::SdkResult;
use crate::paywall::{IntroductoryOfferEligibility, Paywall};
use crate::profile::{Profile, ProfileParameters};
use crate::versioned::{FetchedValue, VersionedValue};

/// Server-signed authorization for a promotional offer. Attached to the
/// platform payment request before submission; a purchase carrying a discount
/// is never submitted without one.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OfferSignature {
    pub key_identifier: String,
    pub nonce: String,
    pub signature: String,
    pub timestamp_ms: i64,
}

/// The remote backend, consumed as an abstract collaborator. Conditional
/// fetches carry the caller's cached content hash and resolve to
/// `FetchedValue::NotModified` when the server reports a match.
pub trait Backend: Send + Sync {
    fn fetch_profile(
        &self,
        profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Profile>>>;

    fn create_profile(
        &self,
        profile_id: &str,
        customer_user_id: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>>;

    fn update_profile(
        &self,
        profile_id: &str,
        params: &ProfileParameters,
    ) -> BoxFuture<'_, SdkResult<VersionedValue<Profile>>>;

    fn set_variation_id(
        &self,
        profile_id: &str,
        transaction_id: &str,
        variation_id: &str,
    ) -> BoxFuture<'_, SdkResult<()>>;

    fn fetch_paywall(
        &self,
        paywall_id: &str,
        profile_id: &str,
        response_hash: Option<&str>,
    ) -> BoxFuture<'_, SdkResult<FetchedValue<Paywall>>>;

    fn sign_subscription_offer(
        &self,
        profile_id: &str,
        vendor_product_id: &str,
        discount_id: &str,
    ) -> BoxFuture<'_, SdkResult<OfferSignature>>;

    fn introductory_eligibility(
        &self,
        profile_id: &str,
        product_ids: &[String],
    ) -> BoxFuture<'_, SdkResult<HashMap<String, IntroductoryOfferEligibility>>>;
}
