use serde::{Deserialize, Serialize};

/// A payload paired with the server-issued content fingerprint it arrived
/// under. The unit of conditional caching: equality compares hashes only,
/// never the payload, so two values with the same hash are the same value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionedValue<T> {
    pub value: T,
    pub hash: String,
}

impl<T> VersionedValue<T> {
    pub fn new(value: T, hash: impl Into<String>) -> Self {
        Self {
            value,
            hash: hash.into(),
        }
    }
}

impl<T> PartialEq for VersionedValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<T> Eq for VersionedValue<T> {}

/// Outcome of a conditional fetch. `NotModified` carries no payload at all:
/// the caller keeps its cached `VersionedValue` untouched instead of
/// overwriting it with empty data.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchedValue<T> {
    NotModified,
    New(VersionedValue<T>),
}
