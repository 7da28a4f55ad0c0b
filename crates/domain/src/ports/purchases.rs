use super::BoxFuture;
use super::backend::OfferSignature;
use crate::SdkResult;

/// Platform payment request handed to the purchase queue, possibly augmented
/// with a signed promotional offer.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentRequest {
    pub vendor_product_id: String,
    pub quantity: u32,
    pub offer_signature: Option<OfferSignature>,
}

/// Ephemeral record tying an initiated purchase to its attribution metadata.
/// Lives from submission until the transaction is terminal and the server has
/// acknowledged it.
#[derive(Clone, Debug, PartialEq)]
pub struct PurchaseContext {
    pub vendor_product_id: String,
    pub paywall_variation_id: String,
    pub promotional_offer_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SettledTransaction {
    pub transaction_id: String,
    pub vendor_product_id: String,
}

/// The platform purchase queue. It owns the transaction lifecycle once a
/// payment has been submitted; there is no cancellation path from here on.
pub trait PurchaseQueue: Send + Sync {
    /// Platform precondition, checked synchronously before any async work.
    fn can_transact(&self) -> bool;

    fn submit(
        &self,
        payment: PaymentRequest,
        context: PurchaseContext,
    ) -> BoxFuture<'_, SdkResult<SettledTransaction>>;

    fn restore_all(&self) -> BoxFuture<'_, SdkResult<Vec<SettledTransaction>>>;
}

/// Whether the running platform can attach signed promotional offers to a
/// payment. Resolved once at construction instead of scattering runtime
/// version checks through the purchase path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferSigningSupport {
    Supported,
    Unsupported,
}
