//! Client-side subscription SDK: a synchronized local cache of the user's
//! entitlement profile and remotely configured paywalls, plus purchase
//! reconciliation against the platform's payment queue.

pub mod client;

pub use client::{Client, Collaborators};
pub use langgan_domain::SdkResult;
pub use langgan_infra::config::SdkConfig;
pub use langgan_infra::logging::init_tracing;
pub use langgan_domain::error::SdkError;
pub use langgan_domain::paywall::{
    IntroductoryOfferEligibility, Paywall, PaywallProduct, ProductDescriptor, ProductsFetchPolicy,
};
pub use langgan_domain::ports::purchases::OfferSigningSupport;
pub use langgan_domain::profile::{Gender, Profile, ProfileParameters};
