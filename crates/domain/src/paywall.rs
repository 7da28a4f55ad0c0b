use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remotely configured set of purchasable products with attribution metadata.
/// Cached per `(paywall_id, profile_id)` since the backend may tailor a
/// paywall to the viewing profile.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Paywall {
    pub paywall_id: String,
    pub variation_id: String,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub ab_test_name: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Whether the user qualifies for an introductory offer. `Unknown` until a
/// receipt-validation round trip completes; unrecognized wire values also
/// decode to `Unknown` rather than failing the whole payload.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntroductoryOfferEligibility {
    Ineligible,
    Eligible,
    // serde requires the catch-all variant to be declared last.
    #[default]
    #[serde(other)]
    Unknown,
}

impl IntroductoryOfferEligibility {
    pub fn as_str(self) -> &'static str {
        match self {
            IntroductoryOfferEligibility::Unknown => "unknown",
            IntroductoryOfferEligibility::Ineligible => "ineligible",
            IntroductoryOfferEligibility::Eligible => "eligible",
        }
    }
}

/// How `get_paywall_products` behaves while receipt validation is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProductsFetchPolicy {
    /// Return products right away; eligibility may still be `Unknown` and
    /// validation continues in the background.
    #[default]
    Default,
    /// Suspend until validation resolves. A failed validation still returns
    /// products, with eligibility left `Unknown`.
    WaitForReceiptValidation,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionPeriod {
    pub unit: PeriodUnit,
    pub number_of_units: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    PayAsYouGo,
    PayUpFront,
    FreeTrial,
}

/// Discounted term attached to a platform product, with display strings
/// already localized by the platform catalog.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProductDiscount {
    #[serde(default)]
    pub identifier: Option<String>,
    pub price: f64,
    pub number_of_periods: u32,
    pub payment_mode: PaymentMode,
    pub subscription_period: SubscriptionPeriod,
    #[serde(default)]
    pub localized_price: Option<String>,
    #[serde(default)]
    pub localized_subscription_period: Option<String>,
}

/// Priced, localized product as resolved by the platform catalog collaborator.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProductDescriptor {
    pub vendor_product_id: String,
    pub localized_title: String,
    pub price: f64,
    #[serde(default)]
    pub currency_code: Option<String>,
    #[serde(default)]
    pub localized_price: Option<String>,
    #[serde(default)]
    pub subscription_period: Option<SubscriptionPeriod>,
    #[serde(default)]
    pub introductory_discount: Option<ProductDiscount>,
    #[serde(default)]
    pub discounts: Vec<ProductDiscount>,
}

impl ProductDescriptor {
    /// The discount identifier a promotional-offer purchase would sign for.
    pub fn promotional_offer_id(&self) -> Option<String> {
        self.discounts
            .iter()
            .find_map(|discount| discount.identifier.clone())
    }
}

/// A purchasable product resolved from a paywall: platform descriptor plus
/// the attribution and eligibility state the reconciler needs.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PaywallProduct {
    pub descriptor: ProductDescriptor,
    pub paywall_variation_id: String,
    #[serde(default)]
    pub promotional_offer_id: Option<String>,
    #[serde(default)]
    pub introductory_offer_eligibility: IntroductoryOfferEligibility,
}

impl PaywallProduct {
    pub fn vendor_product_id(&self) -> &str {
        &self.descriptor.vendor_product_id
    }
}
