//! Template detection

use crate::config::DEFAULT_START_DELIM;
use crate::crypto::PROTECTED_PREFIX;

/// Whether `template` contains the start delimiter or, when
/// `check_encrypted` is set, a protected value marker. An empty
/// `start_delim` means the default `{{`.
pub fn has_template(template: &[u8], start_delim: &str, check_encrypted: bool) -> bool {
    let start_delim = if start_delim.is_empty() {
        DEFAULT_START_DELIM
    } else {
        start_delim
    };

    let found = contains(template, start_delim.as_bytes())
        || (check_encrypted && contains(template, PROTECTED_PREFIX.as_bytes()));
    tracing::trace!(start_delim, check_encrypted, found, "Checked for template");
    found
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delimiter() {
        assert!(has_template(br#"{"a":"{{ .X }}"}"#, "", false));
        assert!(!has_template(br#"{"a":"b"}"#, "", false));
    }

    #[test]
    fn test_custom_delimiter() {
        assert!(has_template(br#"{"a":"{{hub .X hub}}"}"#, "{{hub", false));
        assert!(!has_template(br#"{"a":"{{ .X }}"}"#, "{{hub", false));
    }

    #[test]
    fn test_encrypted_marker() {
        let doc = br#"{"a":"$ocm_encrypted:AAAA"}"#;
        assert!(has_template(doc, "", true));
        assert!(!has_template(doc, "", false));
    }

    #[test]
    fn test_empty_input() {
        assert!(!has_template(b"", "", true));
    }
}
