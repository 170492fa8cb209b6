//! Template resolver
//!
//! Resolves the expressions embedded in a JSON policy document:
//! 1. validate the caller's context
//! 2. convert the document to YAML text
//! 3. decrypt protected values (decrypting mode only)
//! 4. normalize `toInt`/`toBool` quoting and `autoindent`
//! 5. parse and evaluate the template
//! 6. convert the result back to JSON
//!
//! # Example
//!
//! ```rust,ignore
//! use policy_templates::{ResolverConfig, TemplateResolver};
//!
//! let resolver = TemplateResolver::builder()
//!     .with_lookup(lookup)
//!     .with_config(ResolverConfig::default())
//!     .build()?;
//! let resolved = resolver.resolve_template(json, Some(&context)).await?;
//! ```

mod builder;
mod detect;

use serde::Serialize;
use tracing::{debug, error, trace};

use crate::config::{Delimiters, EncryptionMode, ResolverConfig};
use crate::context::ExecutionContext;
use crate::crypto::{DecryptionPipeline, Protector, SharedCipher};
use crate::engine::Template;
use crate::error::{TemplateError, TemplateResult};
use crate::format::{json_to_yaml, yaml_to_json};
use crate::functions::{FunctionRegistry, RegistryContext};
use crate::lookup::{NamespacedLookup, SharedLookup};
use crate::normalize::{TextNormalizer, decrypt_protected_values};

pub use builder::ResolverBuilder;
pub use detect::has_template;

/// Resolves templates in policy documents.
///
/// Holds only immutable state, so one resolver can serve concurrent callers.
pub struct TemplateResolver {
    config: ResolverConfig,
    delims: Delimiters,
    lookup: NamespacedLookup,
    protector: Option<Protector>,
    normalizer: TextNormalizer,
    pipeline: DecryptionPipeline,
}

impl TemplateResolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Validate `config` and create a resolver.
    ///
    /// Fails when an encryption-requiring mode has no key, the IV is not 16
    /// bytes, no cipher is supplied for such a mode, or only one delimiter is
    /// set.
    pub fn new(
        lookup: SharedLookup,
        cipher: Option<SharedCipher>,
        config: ResolverConfig,
    ) -> TemplateResult<Self> {
        let protector = match (config.key_material()?, cipher) {
            (Some(key), Some(cipher)) => Some(Protector::new(cipher, key)),
            (Some(_), None) => {
                return Err(TemplateError::config(format!(
                    "a cipher must be supplied to use the {} encryption mode",
                    config.encryption_mode
                )));
            }
            (None, _) => None,
        };

        let delims = config.delimiters()?;
        debug!(
            "Using the delimiters of {} and {}",
            delims.start(),
            delims.stop()
        );

        Ok(Self {
            lookup: NamespacedLookup::new(lookup, config.lookup_namespace.clone()),
            normalizer: TextNormalizer::new(&delims, config.additional_indentation)?,
            pipeline: DecryptionPipeline::new(config.decryption_concurrency),
            protector,
            delims,
            config,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delims
    }

    /// Whether `template` contains this resolver's start delimiter or, when
    /// `check_encrypted` is set, a protected value
    pub fn has_template(&self, template: &[u8], check_encrypted: bool) -> bool {
        has_template(template, self.delims.start(), check_encrypted)
    }

    /// Resolve a JSON document.
    ///
    /// `context` must serialize to a flat object of string fields; its
    /// fields are available as `{{ .Field }}`. `None` provides no fields.
    pub async fn resolve_template<C>(
        &self,
        json: &[u8],
        context: Option<&C>,
    ) -> TemplateResult<Vec<u8>>
    where
        C: Serialize + ?Sized,
    {
        let context = ExecutionContext::from_serialize(context)?;
        self.resolve_template_with(json, &context).await
    }

    /// Resolve a JSON document against an already validated context
    pub async fn resolve_template_with(
        &self,
        json: &[u8],
        context: &ExecutionContext,
    ) -> TemplateResult<Vec<u8>> {
        debug!("Resolving template of {} byte(s)", json.len());
        let functions = self.function_registry();

        let mut text = json_to_yaml(json)?;
        trace!("Initial template str to resolve: {}", text);

        if self.config.encryption_mode == EncryptionMode::Decrypting {
            if let Some(protector) = &self.protector {
                // Plaintext may be present from here on; the text is no longer traced.
                text = decrypt_protected_values(text, self.pipeline, protector).await?;
            }
        }

        let text = self.normalizer.auto_indent(self.normalizer.coerce(text));

        let template = Template::parse(&text, &self.delims, &functions).map_err(|e| {
            error!("Error parsing the template: {}", e);
            e.with_template(String::from_utf8_lossy(json))
        })?;

        let resolved = template.render(context).map_err(|e| {
            error!("Error resolving the template: {}", e);
            e.with_template(String::from_utf8_lossy(json))
        })?;

        yaml_to_json(&resolved)
    }

    fn function_registry(&self) -> FunctionRegistry {
        let ctx = RegistryContext {
            lookup: self.lookup.clone(),
            protector: self.protector.clone(),
            additional_indentation: self.config.additional_indentation,
        };
        FunctionRegistry::build(
            &ctx,
            self.config.encryption_mode,
            &self.config.disabled_functions,
        )
    }
}

impl std::fmt::Debug for TemplateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateResolver")
            .field("config", &self.config)
            .field("delims", &self.delims)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::XorCipher;
    use crate::crypto::{IV_SIZE, PROTECTED_PREFIX};
    use crate::error::Stage;
    use crate::functions::test_support::StaticLookup;
    use std::collections::HashMap;
    use std::sync::Arc;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn resolver(config: ResolverConfig) -> TemplateResolver {
        TemplateResolver::builder()
            .with_lookup(Arc::new(StaticLookup))
            .with_cipher(Arc::new(XorCipher))
            .with_config(config)
            .build()
            .unwrap()
    }

    fn keyed(mode: EncryptionMode) -> ResolverConfig {
        ResolverConfig::new()
            .with_encryption_mode(mode)
            .with_key_material(KEY.to_vec(), vec![7u8; IV_SIZE])
    }

    async fn resolve(resolver: &TemplateResolver, json: &str) -> TemplateResult<serde_json::Value> {
        let out = resolver.resolve_template::<()>(json.as_bytes(), None).await?;
        Ok(serde_json::from_slice(&out).unwrap())
    }

    #[tokio::test]
    async fn test_base64enc_end_to_end() {
        let resolver = resolver(ResolverConfig::default());
        let out = resolver
            .resolve_template::<()>(br#"{"a":"{{ \"x\" | base64enc }}"}"#, None)
            .await
            .unwrap();
        assert_eq!(out, br#"{"a":"eA=="}"#);
    }

    #[tokio::test]
    async fn test_context_field() {
        let resolver = resolver(ResolverConfig::default());
        let ctx: HashMap<&str, &str> = [("ClusterName", "cluster1")].into_iter().collect();
        let out = resolver
            .resolve_template(br#"{"name":"{{ .ClusterName }}"}"#, Some(&ctx))
            .await
            .unwrap();
        assert_eq!(out, br#"{"name":"cluster1"}"#);
    }

    #[tokio::test]
    async fn test_invalid_context_rejected() {
        let resolver = resolver(ResolverConfig::default());
        let err = resolver
            .resolve_template(br#"{"a":"b"}"#, Some(&vec!["x"]))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ValidateContext));
    }

    #[tokio::test]
    async fn test_coercion_yields_typed_scalars() {
        let resolver = resolver(ResolverConfig::default());
        let value = resolve(
            &resolver,
            r#"{"replicas":"{{ fromConfigMap \"default\" \"settings\" \"replicas\" | toInt }}","enabled":"{{ \"true\" | toBool }}"}"#,
        )
        .await
        .unwrap();
        assert_eq!(value, serde_json::json!({"replicas": 3, "enabled": true}));
    }

    #[tokio::test]
    async fn test_autoindent_end_to_end() {
        let resolver = resolver(ResolverConfig::default());
        let value = resolve(
            &resolver,
            r#"{"data":"{{ fromConfigMap \"default\" \"settings\" \"block\" | autoindent }}"}"#,
        )
        .await
        .unwrap();
        // The padded continuation line folds inside the quoted scalar.
        assert_eq!(value, serde_json::json!({"data": "line1 line2"}));
    }

    #[tokio::test]
    async fn test_protect_disabled_mode() {
        let resolver = resolver(ResolverConfig::default());
        let err = resolve(&resolver, r#"{"a":"{{ \"x\" | protect }}"}"#).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Evaluate));
        assert!(matches!(err.root_cause(), TemplateError::ProtectNotEnabled));
        assert!(err.to_string().contains(r#"{"a":"{{ \"x\" | protect }}"}"#));
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let encrypting = resolver(keyed(EncryptionMode::Encrypting));
        let protected = resolve(&encrypting, r#"{"a":"{{ \"hunter2\" | protect }}"}"#)
            .await
            .unwrap();
        let value = protected["a"].as_str().unwrap().to_string();
        assert!(value.starts_with(PROTECTED_PREFIX));

        let decrypting = resolver(keyed(EncryptionMode::Decrypting).with_decryption_concurrency(4));
        let doc = serde_json::json!({"a": value, "b": value, "c": "plain"}).to_string();
        let decrypted = resolve(&decrypting, &doc).await.unwrap();
        assert_eq!(decrypted, serde_json::json!({"a": "hunter2", "b": "hunter2", "c": "plain"}));
    }

    #[tokio::test]
    async fn test_decryption_failure_has_no_partial_output() {
        let resolver = resolver(keyed(EncryptionMode::Decrypting));
        let err = resolve(&resolver, r#"{"a":"$ocm_encrypted:AAAA"}"#).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Decrypt));
        assert!(err.to_string().contains("$ocm_encrypted:AAAA"));
    }

    #[tokio::test]
    async fn test_parse_error_names_document() {
        let resolver = resolver(ResolverConfig::default());
        let err = resolve(&resolver, r#"{"a":"{{ nosuch }}"}"#).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Parse));
        assert!(err.to_string().contains("nosuch"));
    }

    #[tokio::test]
    async fn test_disabled_function_is_unknown() {
        let resolver = resolver(ResolverConfig::new().with_disabled_functions(["base64enc"]));
        let err = resolve(&resolver, r#"{"a":"{{ \"x\" | base64enc }}"}"#).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Parse));
    }

    #[test]
    fn test_construction_errors() {
        let err = TemplateResolver::builder().build().unwrap_err();
        assert!(err.to_string().contains("cluster lookup"));

        let err = TemplateResolver::builder()
            .with_lookup(Arc::new(StaticLookup))
            .with_config(ResolverConfig::new().with_encryption_mode(EncryptionMode::Decrypting))
            .build()
            .unwrap_err();
        assert!(matches!(err, TemplateError::AesKeyNotSet));

        let err = TemplateResolver::builder()
            .with_lookup(Arc::new(StaticLookup))
            .with_config(
                ResolverConfig::new()
                    .with_encryption_mode(EncryptionMode::Encrypting)
                    .with_key_material(KEY.to_vec(), vec![0u8; 8]),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidIv { len: 8 }));

        let err = TemplateResolver::builder()
            .with_lookup(Arc::new(StaticLookup))
            .with_config(keyed(EncryptionMode::Encrypting))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cipher"));

        let mut config = ResolverConfig::new();
        config.start_delim = Some("[[".to_string());
        let err = TemplateResolver::builder()
            .with_lookup(Arc::new(StaticLookup))
            .with_config(config)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cannot be set independently"));
    }

    #[test]
    fn test_resolver_has_template_uses_its_delimiter() {
        let resolver = resolver(ResolverConfig::new().with_delimiters("{{hub", "hub}}"));
        assert!(resolver.has_template(b"{{hub .X hub}}", false));
        assert!(!resolver.has_template(b"{{ .X }}", false));
    }

    #[test]
    fn test_resolver_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TemplateResolver>();
    }
}
