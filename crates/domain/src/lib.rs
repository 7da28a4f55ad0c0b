pub mod cache;
pub mod error;
pub mod paywall;
pub mod paywalls;
pub mod ports;
pub mod profile;
pub mod profiles;
pub mod purchases;
pub mod single_flight;
pub mod util;
pub mod versioned;

#[cfg(test)]
pub(crate) mod testing;

pub type SdkResult<T> = Result<T, error::SdkError>;
