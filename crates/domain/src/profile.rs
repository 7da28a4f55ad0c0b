use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Local representation of a user's entitlement and purchase state. Mutated
/// only through explicit update operations; network responses replace the
/// whole object, keyed by the response's own content hash.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub profile_id: String,
    #[serde(default)]
    pub customer_user_id: Option<String>,
    #[serde(default)]
    pub access_levels: HashMap<String, AccessLevel>,
    #[serde(default)]
    pub subscriptions: HashMap<String, Subscription>,
    #[serde(default)]
    pub non_subscriptions: HashMap<String, Vec<NonSubscription>>,
    #[serde(default)]
    pub custom_attributes: HashMap<String, Value>,
}

impl Profile {
    /// Whether the given access level is currently granted. Checking this is
    /// usually all an application needs to gate premium functionality.
    pub fn has_active_access(&self, access_level_id: &str) -> bool {
        self.access_levels
            .get(access_level_id)
            .is_some_and(|level| level.is_active)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AccessLevel {
    pub id: String,
    pub is_active: bool,
    pub vendor_product_id: String,
    pub activated_at_ms: i64,
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
    #[serde(default)]
    pub will_renew: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub vendor_product_id: String,
    pub is_active: bool,
    pub activated_at_ms: i64,
    #[serde(default)]
    pub renewed_at_ms: Option<i64>,
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
    #[serde(default)]
    pub unsubscribed_at_ms: Option<i64>,
    #[serde(default)]
    pub is_in_grace_period: bool,
    #[serde(default)]
    pub will_renew: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NonSubscription {
    pub purchase_id: String,
    pub vendor_product_id: String,
    pub purchased_at_ms: i64,
    #[serde(default)]
    pub is_refund: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// Optional attribute updates submitted through `update_profile`.
///
/// `analytics_disabled` is a local-only flag: it is applied and persisted on
/// the device regardless of whether the network submission succeeds, and is
/// never sent to the backend.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ProfileParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom_attributes: HashMap<String, Value>,
    #[serde(skip_serializing)]
    pub analytics_disabled: Option<bool>,
}

impl ProfileParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_birthday(mut self, birthday: impl Into<String>) -> Self {
        self.birthday = Some(birthday.into());
        self
    }

    pub fn with_custom_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_attributes.insert(key.into(), value);
        self
    }

    pub fn with_analytics_disabled(mut self, disabled: bool) -> Self {
        self.analytics_disabled = Some(disabled);
        self
    }

    /// Whether anything here needs a backend round trip at all.
    pub fn has_remote_changes(&self) -> bool {
        self.email.is_some()
            || self.phone_number.is_some()
            || self.first_name.is_some()
            || self.last_name.is_some()
            || self.gender.is_some()
            || self.birthday.is_some()
            || !self.custom_attributes.is_empty()
    }
}
