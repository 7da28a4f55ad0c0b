use thiserror::Error;

/// Typed failure surface of every public SDK operation.
///
/// `Clone + PartialEq` so a single resolved outcome can be fanned out to all
/// single-flight waiters and asserted on in tests.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SdkError {
    #[error("sdk has already been activated")]
    AlreadyActivated,
    #[error("sdk is not activated")]
    NotActivated,
    #[error("identity switch rejected: {0}")]
    IdentityConflict(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("response decode error: {0}")]
    Decoding(String),
    #[error("this device is not allowed to make payments")]
    NotEligibleToTransact,
    #[error("promotional offer signing failed: {0}")]
    DiscountSigningFailed(String),
    #[error("store transaction failed: {0}")]
    PlatformTransaction(String),
    #[error("profile manager is unavailable")]
    ManagerUnavailable,
}

impl SdkError {
    /// Whether a caller may retry the same call unchanged and expect it to
    /// eventually succeed. Manager unavailability clears once the identity
    /// switch in progress settles.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SdkError::Network(_) | SdkError::ManagerUnavailable)
    }
}
