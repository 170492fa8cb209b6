//! Resolver configuration
//!
//! [`ResolverConfig`] is the immutable value handed to the resolver;
//! [`ConfigLoader`] builds one from files and environment variables.

mod loader;
mod model;

pub use loader::{ConfigLoader, ConfigSource, ENV_PREFIX};
pub use model::{
    DEFAULT_START_DELIM, DEFAULT_STOP_DELIM, Delimiters, EncryptionMode, ResolverConfig,
};
