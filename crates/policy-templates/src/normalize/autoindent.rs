//! Auto-indent pass
//!
//! `{{ ... | autoindent }}` is rewritten to `{{ ... | indent N }}`, where `N`
//! is the number of spaces preceding the expression on its line minus the
//! configured additional indentation.

use regex::Regex;
use tracing::warn;

use crate::config::Delimiters;
use crate::error::{TemplateError, TemplateResult};

/// Compile the auto-indent pattern for a delimiter pair
pub(super) fn pattern(delims: &Delimiters) -> TemplateResult<Regex> {
    let start = regex::escape(delims.start());
    let stop = regex::escape(delims.stop());
    Regex::new(&format!(
        r#"( *)(?:'|")?({start}.*\| *autoindent *{stop})"#
    ))
    .map_err(|e| TemplateError::config(format!("invalid autoindent pattern: {}", e)))
}

/// Whether the pass can change `text` at all
pub(super) fn applies(text: &str) -> bool {
    text.contains("autoindent")
}

pub(super) fn apply(re: &Regex, text: &str, additional_indentation: u32) -> String {
    let mut processed = text.to_string();

    for caps in re.captures_iter(text) {
        let (Some(spaces), Some(expression)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let expression = expression.as_str();

        let measured = spaces.as_str().len();
        let offset = additional_indentation as usize;
        let width = match measured.checked_sub(offset) {
            Some(width) => width,
            None => {
                warn!(
                    "autoindent found {} leading space(s), fewer than the additional indentation of {}; using indent 0",
                    measured, offset
                );
                0
            }
        };

        let rewritten = expression.replacen("autoindent", &format!("indent {}", width), 1);
        processed = processed.replacen(expression, &rewritten, 1);
    }

    processed
}
