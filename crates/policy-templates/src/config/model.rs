//! Resolver configuration model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::KeyMaterial;
use crate::error::{TemplateError, TemplateResult};

/// Default start delimiter of a template action
pub const DEFAULT_START_DELIM: &str = "{{";
/// Default stop delimiter of a template action
pub const DEFAULT_STOP_DELIM: &str = "}}";

/// How protected values are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// `protect` errors; `fromSecret` returns plain values.
    #[default]
    Disabled,
    /// `protect` is available and `fromSecret` returns protected values.
    Encrypting,
    /// Protected values in the document are decrypted before evaluation;
    /// `protect` errors.
    Decrypting,
}

impl EncryptionMode {
    /// Whether this mode needs key material
    pub fn requires_key(&self) -> bool {
        matches!(self, Self::Encrypting | Self::Decrypting)
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Encrypting => f.write_str("encrypting"),
            Self::Decrypting => f.write_str("decrypting"),
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "" => Ok(Self::Disabled),
            "encrypting" | "encryption" => Ok(Self::Encrypting),
            "decrypting" | "decryption" => Ok(Self::Decrypting),
            other => Err(TemplateError::config(format!(
                "Unknown encryption mode '{}'. Valid modes are: disabled, encrypting, decrypting",
                other
            ))),
        }
    }
}

/// Validated start/stop delimiter pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    start: String,
    stop: String,
}

impl Delimiters {
    /// Both empty selects the defaults; setting only one is an error.
    pub fn new(start: &str, stop: &str) -> TemplateResult<Self> {
        match (start.is_empty(), stop.is_empty()) {
            (true, true) => Ok(Self::default()),
            (false, false) => Ok(Self {
                start: start.to_string(),
                stop: stop.to_string(),
            }),
            _ => Err(TemplateError::config(
                "the configurations StartDelim and StopDelim cannot be set independently",
            )),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn stop(&self) -> &str {
        &self.stop
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_DELIM.to_string(),
            stop: DEFAULT_STOP_DELIM.to_string(),
        }
    }
}

/// Configuration for a [`TemplateResolver`](crate::TemplateResolver).
///
/// - `additional_indentation` is added to every `indent` width, for manifests
///   whose indentation is relative to a logical starting point.
/// - `aes_key` and `initialization_vector` are required by the encrypting and
///   decrypting modes. The IV must be one AES block (16 bytes); every value
///   protected by one resolver shares it.
/// - `decryption_concurrency` caps the decryption workers; 0 and 1 both mean
///   sequential.
/// - `disabled_functions` are removed from the function registry.
/// - `lookup_namespace` restricts namespaced lookups to one namespace.
/// - `start_delim`/`stop_delim` must be set together; they default to
///   `{{`/`}}`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub additional_indentation: u32,
    #[serde(with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub aes_key: Option<Vec<u8>>,
    #[serde(with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub initialization_vector: Option<Vec<u8>>,
    pub decryption_concurrency: u8,
    pub disabled_functions: Vec<String>,
    pub encryption_mode: EncryptionMode,
    pub lookup_namespace: Option<String>,
    pub start_delim: Option<String>,
    pub stop_delim: Option<String>,
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_additional_indentation(mut self, spaces: u32) -> Self {
        self.additional_indentation = spaces;
        self
    }

    pub fn with_key_material(mut self, key: impl Into<Vec<u8>>, iv: impl Into<Vec<u8>>) -> Self {
        self.aes_key = Some(key.into());
        self.initialization_vector = Some(iv.into());
        self
    }

    pub fn with_decryption_concurrency(mut self, limit: u8) -> Self {
        self.decryption_concurrency = limit;
        self
    }

    pub fn with_disabled_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_functions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.encryption_mode = mode;
        self
    }

    pub fn with_lookup_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lookup_namespace = Some(namespace.into());
        self
    }

    pub fn with_delimiters(mut self, start: impl Into<String>, stop: impl Into<String>) -> Self {
        self.start_delim = Some(start.into());
        self.stop_delim = Some(stop.into());
        self
    }

    /// Check every invariant the resolver relies on
    pub fn validate(&self) -> TemplateResult<()> {
        self.key_material()?;
        self.delimiters()?;
        Ok(())
    }

    /// Validated delimiter pair, defaults applied
    pub fn delimiters(&self) -> TemplateResult<Delimiters> {
        Delimiters::new(
            self.start_delim.as_deref().unwrap_or_default(),
            self.stop_delim.as_deref().unwrap_or_default(),
        )
    }

    /// Key material for encryption-requiring modes, `None` otherwise
    pub fn key_material(&self) -> TemplateResult<Option<KeyMaterial>> {
        if !self.encryption_mode.requires_key() {
            return Ok(None);
        }
        let key = match &self.aes_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => return Err(TemplateError::AesKeyNotSet),
        };
        let iv = self.initialization_vector.as_deref().unwrap_or_default();
        KeyMaterial::new(key, iv).map(Some)
    }

    /// Overlay the values that `other` sets on top of `self`
    pub fn merge(&mut self, other: ResolverConfig) {
        if other.additional_indentation > 0 {
            self.additional_indentation = other.additional_indentation;
        }
        if other.aes_key.is_some() {
            self.aes_key = other.aes_key;
        }
        if other.initialization_vector.is_some() {
            self.initialization_vector = other.initialization_vector;
        }
        if other.decryption_concurrency > 0 {
            self.decryption_concurrency = other.decryption_concurrency;
        }
        if !other.disabled_functions.is_empty() {
            self.disabled_functions = other.disabled_functions;
        }
        if other.encryption_mode != EncryptionMode::Disabled {
            self.encryption_mode = other.encryption_mode;
        }
        if other.lookup_namespace.is_some() {
            self.lookup_namespace = other.lookup_namespace;
        }
        if other.start_delim.is_some() || other.stop_delim.is_some() {
            self.start_delim = other.start_delim;
            self.stop_delim = other.stop_delim;
        }
    }
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<Vec<u8>>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ResolverConfig")
            .field("additional_indentation", &self.additional_indentation)
            .field("aes_key", &redact(&self.aes_key))
            .field("initialization_vector", &redact(&self.initialization_vector))
            .field("decryption_concurrency", &self.decryption_concurrency)
            .field("disabled_functions", &self.disabled_functions)
            .field("encryption_mode", &self.encryption_mode)
            .field("lookup_namespace", &self.lookup_namespace)
            .field("start_delim", &self.start_delim)
            .field("stop_delim", &self.stop_delim)
            .finish()
    }
}

/// Key material travels as base64 text in config files.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.encryption_mode, EncryptionMode::Disabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.delimiters().unwrap(), Delimiters::default());
        assert!(config.key_material().unwrap().is_none());
    }

    #[test]
    fn test_key_required_for_encrypting() {
        let config = ResolverConfig::new().with_encryption_mode(EncryptionMode::Encrypting);
        assert!(matches!(config.validate(), Err(TemplateError::AesKeyNotSet)));

        let config = ResolverConfig::new()
            .with_encryption_mode(EncryptionMode::Decrypting)
            .with_key_material(Vec::new(), vec![0u8; 16]);
        assert!(matches!(config.validate(), Err(TemplateError::AesKeyNotSet)));
    }

    #[test]
    fn test_iv_must_be_sixteen_bytes() {
        for len in [0usize, 8, 15, 17, 32] {
            let config = ResolverConfig::new()
                .with_encryption_mode(EncryptionMode::Decrypting)
                .with_key_material(b"key".to_vec(), vec![0u8; len]);
            match config.validate() {
                Err(TemplateError::InvalidIv { len: got }) => assert_eq!(got, len),
                other => panic!("expected InvalidIv for {len} bytes, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_key_ignored_when_disabled() {
        let config = ResolverConfig::new().with_key_material(b"key".to_vec(), vec![0u8; 3]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_delimiters_set_together() {
        let mut config = ResolverConfig::new();
        config.start_delim = Some("{{hub".to_string());
        assert!(matches!(config.validate(), Err(TemplateError::Config { .. })));

        let config = ResolverConfig::new().with_delimiters("{{hub", "hub}}");
        let delims = config.delimiters().unwrap();
        assert_eq!(delims.start(), "{{hub");
        assert_eq!(delims.stop(), "hub}}");
    }

    #[test]
    fn test_encryption_mode_from_str() {
        assert_eq!("Decrypting".parse::<EncryptionMode>().unwrap(), EncryptionMode::Decrypting);
        assert_eq!("encrypting".parse::<EncryptionMode>().unwrap(), EncryptionMode::Encrypting);
        assert!("sometimes".parse::<EncryptionMode>().is_err());
    }

    #[test]
    fn test_key_material_serde_is_base64() {
        let config = ResolverConfig::new().with_key_material(b"abc".to_vec(), vec![1u8; 16]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["aes_key"], "YWJj");

        let back: ResolverConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ResolverConfig::new().with_key_material(b"hunter2".to_vec(), vec![1u8; 16]);
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_merge_overlays_set_values() {
        let mut base = ResolverConfig::new().with_additional_indentation(2);
        base.merge(
            ResolverConfig::new()
                .with_decryption_concurrency(4)
                .with_delimiters("[[", "]]"),
        );
        assert_eq!(base.additional_indentation, 2);
        assert_eq!(base.decryption_concurrency, 4);
        assert_eq!(base.start_delim.as_deref(), Some("[["));
    }
}
