//! Core error types for template resolution

use std::fmt;

use thiserror::Error;

use crate::crypto::CipherError;
use crate::lookup::LookupError;

/// Result type alias for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Stage of a single resolve call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateContext,
    ConvertToYaml,
    Decrypt,
    Parse,
    Evaluate,
    ConvertToJson,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidateContext => "validate context",
            Stage::ConvertToYaml => "convert the policy template to YAML",
            Stage::Decrypt => "decrypt protected values",
            Stage::Parse => "parse the template",
            Stage::Evaluate => "resolve the template",
            Stage::ConvertToJson => "convert the resolved template back to JSON",
        };
        f.write_str(name)
    }
}

fn snippet(template: &Option<String>) -> String {
    match template {
        Some(t) => format!(" {}", t),
        None => String::new(),
    }
}

/// Main error type for template resolution
#[derive(Error, Debug, Clone)]
pub enum TemplateError {
    /// Invalid resolver construction or configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// An encryption-requiring mode was selected without a key
    #[error("AESKey must be set to use this encryption mode")]
    AesKeyNotSet,

    /// The initialization vector is not one AES block long
    #[error("InitializationVector must be 128 bits, got {len} bytes")]
    InvalidIv { len: usize },

    /// The caller-supplied context is not a flat record of strings
    #[error("the input context must be a struct with string fields: {message}")]
    Context { message: String },

    /// JSON/YAML conversion failed
    #[error("failed to {stage}: {message}")]
    Conversion { stage: Stage, message: String },

    /// The template text could not be parsed
    #[error("failed to parse the template{}: line {line}: {message}", snippet(.template))]
    Parse {
        message: String,
        line: usize,
        template: Option<String>,
    },

    /// A protected value could not be decrypted
    #[error("decryption of {occurrence} failed: {source}")]
    Decryption {
        occurrence: String,
        #[source]
        source: CipherError,
    },

    /// A lookup collaborator failed
    #[error("{function}: {source}")]
    Lookup {
        function: String,
        #[source]
        source: LookupError,
    },

    /// A template function returned an error
    #[error("error calling {function}: {message}")]
    Function { function: String, message: String },

    /// `protect` was called outside of the encrypting mode
    #[error("the protect template function is not enabled in this mode")]
    ProtectNotEnabled,

    /// Execution of the parsed template failed (missing field, bad operand)
    #[error("line {line}: {message}")]
    Execution { message: String, line: usize },

    /// Evaluation of a template failed; wraps the underlying error
    #[error("failed to resolve the template{}: {source}", snippet(.template))]
    Evaluation {
        template: Option<String>,
        #[source]
        source: Box<TemplateError>,
    },

    /// IO errors while loading configuration
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },
}

impl TemplateError {
    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "TEMPLATE_CONFIG",
            Self::AesKeyNotSet => "TEMPLATE_AES_KEY_NOT_SET",
            Self::InvalidIv { .. } => "TEMPLATE_INVALID_IV",
            Self::Context { .. } => "TEMPLATE_CONTEXT",
            Self::Conversion { .. } => "TEMPLATE_CONVERSION",
            Self::Parse { .. } => "TEMPLATE_PARSE",
            Self::Decryption { .. } => "TEMPLATE_DECRYPTION",
            Self::Lookup { .. } => "TEMPLATE_LOOKUP",
            Self::Function { .. } => "TEMPLATE_FUNCTION",
            Self::ProtectNotEnabled => "TEMPLATE_PROTECT_NOT_ENABLED",
            Self::Execution { .. } => "TEMPLATE_EXECUTION",
            Self::Evaluation { .. } => "TEMPLATE_EVALUATION",
            Self::Io { .. } => "TEMPLATE_IO",
        }
    }

    /// The resolve stage this error belongs to, if it was raised by one
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Context { .. } => Some(Stage::ValidateContext),
            Self::Conversion { stage, .. } => Some(*stage),
            Self::Decryption { .. } => Some(Stage::Decrypt),
            Self::Parse { .. } => Some(Stage::Parse),
            Self::Lookup { .. }
            | Self::Function { .. }
            | Self::ProtectNotEnabled
            | Self::Execution { .. }
            | Self::Evaluation { .. } => Some(Stage::Evaluate),
            Self::Config { .. } | Self::AesKeyNotSet | Self::InvalidIv { .. } | Self::Io { .. } => {
                None
            }
        }
    }

    /// Walk through evaluation wrappers to the error a function raised
    pub fn root_cause(&self) -> &TemplateError {
        match self {
            Self::Evaluation { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
