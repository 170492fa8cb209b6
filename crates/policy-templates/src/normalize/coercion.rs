//! Coercion pass
//!
//! A quoted expression ending in `toInt` or `toBool` would still be emitted
//! as a YAML string after evaluation. This pass removes the quotes (and any
//! block scalar indicator) wrapping such expressions so the result is parsed
//! as a number or boolean. The expression text itself is untouched.

use regex::Regex;

use crate::config::Delimiters;
use crate::error::{TemplateError, TemplateResult};

/// Compile the coercion pattern for a delimiter pair
pub(super) fn pattern(delims: &Delimiters) -> TemplateResult<Regex> {
    let start = regex::escape(delims.start());
    let stop = regex::escape(delims.stop());
    Regex::new(&format!(
        r#":\s+(?:[\|>][-]?\s+)?(?:['|"]\s*)?({start}.*?\s+\|\s+(?:toInt|toBool)\s*{stop})(?:\s*['|"])?"#
    ))
    .map_err(|e| TemplateError::config(format!("invalid coercion pattern: {}", e)))
}

/// Whether the pass can change `text` at all
pub(super) fn applies(text: &str) -> bool {
    text.contains("toInt") || text.contains("toBool")
}

pub(super) fn apply(re: &Regex, text: &str) -> String {
    re.replace_all(text, ": ${1}").into_owned()
}
