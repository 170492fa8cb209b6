//! Text normalization passes
//!
//! Rewrites applied to the YAML text before it is parsed as a template:
//! - Decrypt: protected values are replaced by their plaintext
//! - Coercion: quotes around `toInt`/`toBool` expressions are removed
//! - Auto-indent: `autoindent` becomes `indent N`
//!
//! Each pass is skipped when a cheap substring check shows it cannot apply.

mod autoindent;
mod coercion;
mod encrypted;

use regex::Regex;

use crate::config::Delimiters;
use crate::error::TemplateResult;

pub use encrypted::{decrypt_protected_values, find_occurrences};

/// Delimiter-specific passes, compiled once per resolver
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    coercion: Regex,
    autoindent: Regex,
    additional_indentation: u32,
}

impl TextNormalizer {
    pub fn new(delims: &Delimiters, additional_indentation: u32) -> TemplateResult<Self> {
        Ok(Self {
            coercion: coercion::pattern(delims)?,
            autoindent: autoindent::pattern(delims)?,
            additional_indentation,
        })
    }

    /// Unquote `toInt`/`toBool` expressions
    pub fn coerce(&self, text: String) -> String {
        if !coercion::applies(&text) {
            return text;
        }
        tracing::debug!("Processing toInt/toBool expressions");
        coercion::apply(&self.coercion, &text)
    }

    /// Convert `autoindent` placeholders to `indent N`
    pub fn auto_indent(&self, text: String) -> String {
        if !autoindent::applies(&text) {
            return text;
        }
        tracing::debug!("Processing autoindent expressions");
        autoindent::apply(&self.autoindent, &text, self.additional_indentation)
    }
}
