//! Value types shared by the engine, the stores and the adapters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Composite identity of an idempotent operation: who, which operation
/// family, and which client-chosen token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey {
    actor_id: String,
    scope: String,
    key: String,
}

impl IdempotencyKey {
    /// Build a key, rejecting blank components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if any component is empty or whitespace.
    pub fn new(
        actor_id: impl Into<String>,
        scope: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self> {
        let actor_id = actor_id.into();
        let scope = scope.into();
        let key = key.into();

        [("actor id", &actor_id), ("scope", &scope), ("key", &key)]
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map_or(Ok(()), |(name, _)| {
                Err(Error::invalid_key(format!("{name} must not be empty")))
            })?;

        Ok(Self {
            actor_id,
            scope,
            key,
        })
    }

    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.actor_id, self.scope, self.key)
    }
}

/// Opaque token identifying the logical content of a request.
///
/// Two fingerprints are equal only if their strings are byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    const CONSTANT: &'static str = "constant";

    /// Wrap an already computed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// A fingerprint that treats every payload as the same request.
    #[must_use]
    pub fn constant() -> Self {
        Self(Self::CONSTANT.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    /// Claimed; the owner is executing the operation.
    InProgress,
    /// The owner reported a result; replays are served from it.
    Completed,
}

impl IdempotencyStatus {
    /// Wire representation used by persistent backends.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uninterpreted result snapshot. The schema belongs to the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyData(BTreeMap<String, String>);

impl IdempotencyData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<BTreeMap<String, String>> for IdempotencyData {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IdempotencyData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Everything the engine needs to know about one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRequest {
    pub key: IdempotencyKey,
    pub fingerprint: RequestFingerprint,
}

impl IdempotencyRequest {
    #[must_use]
    pub const fn new(key: IdempotencyKey, fingerprint: RequestFingerprint) -> Self {
        Self { key, fingerprint }
    }

    /// Build a request from raw components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] if any key component is blank.
    pub fn from_parts(
        actor_id: impl Into<String>,
        scope: impl Into<String>,
        key: impl Into<String>,
        fingerprint: RequestFingerprint,
    ) -> Result<Self> {
        Ok(Self::new(IdempotencyKey::new(actor_id, scope, key)?, fingerprint))
    }
}
