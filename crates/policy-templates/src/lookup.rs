//! Cluster lookup seam
//!
//! The resolver never talks to a cluster itself. Lookup template functions
//! delegate to a [`ClusterLookup`] implementation supplied by the caller,
//! after checking the optional namespace restriction.

use std::sync::Arc;

use thiserror::Error;

/// Errors returned by a [`ClusterLookup`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{kind} {name} not found in namespace {namespace:?}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("key {key} not found in {kind} {name}")]
    MissingKey {
        kind: String,
        name: String,
        key: String,
    },

    #[error("the namespace argument passed to {function} is restricted to {allowed}")]
    NamespaceRestricted { function: String, allowed: String },

    #[error("lookup failed: {0}")]
    Backend(String),
}

/// Read access to cluster resources used by the lookup template functions.
///
/// Implementations must be safe to call from concurrent resolve calls.
pub trait ClusterLookup: Send + Sync {
    /// Value of `key` in the secret's data, base64 encoded as stored.
    fn secret(&self, namespace: &str, name: &str, key: &str) -> Result<String, LookupError>;

    /// Value of `key` in the configmap's data.
    fn config_map(&self, namespace: &str, name: &str, key: &str) -> Result<String, LookupError>;

    /// Value of the named cluster claim.
    fn cluster_claim(&self, name: &str) -> Result<String, LookupError>;

    /// Whole resource as a JSON object. An empty `namespace` means cluster scoped.
    fn resource(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<serde_json::Value, LookupError>;
}

/// Shared handle to a lookup implementation
pub type SharedLookup = Arc<dyn ClusterLookup>;

/// Enforces the configured lookup namespace before delegating.
#[derive(Clone)]
pub(crate) struct NamespacedLookup {
    inner: SharedLookup,
    allowed: Option<String>,
}

impl NamespacedLookup {
    pub(crate) fn new(inner: SharedLookup, allowed: Option<String>) -> Self {
        Self {
            inner,
            allowed: allowed.filter(|ns| !ns.is_empty()),
        }
    }

    fn check(&self, function: &str, namespace: &str) -> Result<(), LookupError> {
        match &self.allowed {
            Some(allowed) if allowed != namespace => Err(LookupError::NamespaceRestricted {
                function: function.to_string(),
                allowed: allowed.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn secret(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, LookupError> {
        self.check("fromSecret", namespace)?;
        self.inner.secret(namespace, name, key)
    }

    pub(crate) fn config_map(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<String, LookupError> {
        self.check("fromConfigMap", namespace)?;
        self.inner.config_map(namespace, name, key)
    }

    pub(crate) fn cluster_claim(&self, name: &str) -> Result<String, LookupError> {
        self.inner.cluster_claim(name)
    }

    pub(crate) fn resource(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<serde_json::Value, LookupError> {
        self.check("lookup", namespace)?;
        self.inner.resource(api_version, kind, namespace, name)
    }
}
