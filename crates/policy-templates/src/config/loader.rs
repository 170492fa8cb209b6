//! Configuration loading
//!
//! Sources are applied in the order they were added; values set by a later
//! source override earlier ones. The merged result is validated before it is
//! returned.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::model::ResolverConfig;
use crate::error::{TemplateError, TemplateResult};

/// Prefix of the environment variables read by [`ConfigSource::Environment`]
pub const ENV_PREFIX: &str = "POLICY_TEMPLATES_";

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a JSON, YAML or TOML file
    File(PathBuf),
    /// Configuration from `POLICY_TEMPLATES_*` environment variables
    Environment,
    /// Configuration from explicit `POLICY_TEMPLATES_*` style key/value pairs
    Variables(HashMap<String, String>),
    /// Default configuration
    Default,
}

/// Configuration loader with support for multiple sources
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add explicit variables, named like the environment variables
    pub fn with_vars(self, vars: HashMap<String, String>) -> Self {
        self.add_source(ConfigSource::Variables(vars))
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources
    pub fn load(self) -> TemplateResult<ResolverConfig> {
        let mut config = ResolverConfig::default();

        for source in &self.sources {
            let source_config = load_from_source(source)?;
            config.merge(source_config);
        }

        config.validate()?;
        tracing::debug!(
            "Loaded resolver config: mode={}, concurrency={}",
            config.encryption_mode,
            config.decryption_concurrency
        );
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_from_source(source: &ConfigSource) -> TemplateResult<ResolverConfig> {
    match source {
        ConfigSource::File(path) => {
            tracing::debug!("Loading config from file: {}", path.display());
            load_from_file(path)
        }
        ConfigSource::Environment => {
            tracing::debug!("Loading config from environment");
            load_from_vars(env::vars())
        }
        ConfigSource::Variables(vars) => {
            tracing::debug!("Loading config from {} variable(s)", vars.len());
            load_from_vars(vars.iter().map(|(k, v)| (k.clone(), v.clone())))
        }
        ConfigSource::Default => Ok(ResolverConfig::default()),
    }
}

/// Load configuration from a file; a missing file yields the defaults
fn load_from_file(path: &Path) -> TemplateResult<ResolverConfig> {
    if !path.exists() {
        return Ok(ResolverConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        TemplateError::io_with_path(
            format!("Failed to read config file: {}", e),
            path.display().to_string(),
        )
    })?;

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|e| {
            TemplateError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
            TemplateError::config_with_context(
                format!("Failed to parse YAML config: {}", e),
                format!("Deserializing YAML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(&content).map_err(|e| {
            TemplateError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(config)
}

fn load_from_vars<I>(vars: I) -> TemplateResult<ResolverConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut config = ResolverConfig::default();

    for (name, value) in vars {
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };

        match key {
            "ADDITIONAL_INDENTATION" => {
                config.additional_indentation = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid_var(&name, "a non-negative integer"))?;
            }
            "AES_KEY" => config.aes_key = Some(decode_var(&name, &value)?),
            "INITIALIZATION_VECTOR" => {
                config.initialization_vector = Some(decode_var(&name, &value)?)
            }
            "DECRYPTION_CONCURRENCY" => {
                config.decryption_concurrency = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid_var(&name, "an integer between 0 and 255"))?;
            }
            "DISABLED_FUNCTIONS" => {
                config.disabled_functions = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "ENCRYPTION_MODE" => config.encryption_mode = value.parse()?,
            "LOOKUP_NAMESPACE" => config.lookup_namespace = Some(value),
            "START_DELIM" => config.start_delim = Some(value),
            "STOP_DELIM" => config.stop_delim = Some(value),
            _ => tracing::debug!("Ignoring unknown variable {}", name),
        }
    }

    Ok(config)
}

fn decode_var(name: &str, value: &str) -> TemplateResult<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| invalid_var(name, "base64"))
}

fn invalid_var(name: &str, expected: &str) -> TemplateError {
    TemplateError::config(format!("Invalid {} value, expected {}", name, expected))
}
