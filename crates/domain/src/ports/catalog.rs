use super::BoxFuture;
use crate::SdkResult;
use crate::paywall::ProductDescriptor;

/// Resolves product identifiers to priced, localized platform descriptors
/// with their discount metadata.
pub trait ProductCatalog: Send + Sync {
    fn products(&self, product_ids: &[String]) -> BoxFuture<'_, SdkResult<Vec<ProductDescriptor>>>;
}
