//! Builder pattern for creating template resolvers

use crate::config::ResolverConfig;
use crate::crypto::SharedCipher;
use crate::error::{TemplateError, TemplateResult};
use crate::lookup::SharedLookup;

use super::TemplateResolver;

/// Builder for creating template resolvers with a fluent API
#[derive(Default)]
pub struct ResolverBuilder {
    lookup: Option<SharedLookup>,
    cipher: Option<SharedCipher>,
    config: ResolverConfig,
}

impl ResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lookup used by `fromSecret`, `fromConfigMap`,
    /// `fromClusterClaim` and `lookup`
    pub fn with_lookup(mut self, lookup: SharedLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Set the cipher for protected values; required by the encrypting and
    /// decrypting modes
    pub fn with_cipher(mut self, cipher: SharedCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build the resolver
    pub fn build(self) -> TemplateResult<TemplateResolver> {
        let lookup = self
            .lookup
            .ok_or_else(|| TemplateError::config("a cluster lookup must be supplied"))?;
        TemplateResolver::new(lookup, self.cipher, self.config)
    }
}
