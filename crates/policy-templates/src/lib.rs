//! Policy Templates
//!
//! Resolves the template expressions embedded in JSON policy manifests.
//! A document is converted to YAML, protected values are optionally
//! decrypted, the expressions are evaluated against a caller-supplied
//! context and a registry of lookup and formatting functions, and the
//! result is converted back to JSON.
//!
//! Cluster access and the block cipher are supplied by the caller through
//! the [`ClusterLookup`] and [`ValueCipher`] traits.

pub mod config;
pub mod context;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod format;
pub mod functions;
pub mod lookup;
pub mod normalize;
pub mod resolver;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigSource, DEFAULT_START_DELIM, DEFAULT_STOP_DELIM, Delimiters,
    EncryptionMode, ResolverConfig,
};
pub use context::ExecutionContext;
pub use crypto::{
    CipherError, DecryptionPipeline, IV_SIZE, KeyMaterial, PROTECTED_PREFIX, Protector,
    SharedCipher, ValueCipher,
};
pub use engine::{Template, Value};
pub use error::{Stage, TemplateError, TemplateResult};
pub use format::{json_to_yaml, yaml_to_json};
pub use functions::{FunctionRegistry, TemplateFunction};
pub use lookup::{ClusterLookup, LookupError, SharedLookup};
pub use resolver::{ResolverBuilder, TemplateResolver, has_template};
