//! Decrypt pass
//!
//! Replaces every `$ocm_encrypted:<base64>` occurrence with its plaintext.
//! Identical ciphertexts are not deduplicated; each occurrence is decrypted
//! and spliced back by its own span.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::crypto::{DecryptionPipeline, Occurrence, PROTECTED_PREFIX, Protector};
use crate::error::{TemplateError, TemplateResult};

static PROTECTED_VALUE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(&format!("{}([a-zA-Z0-9+/=]+)", regex::escape(PROTECTED_PREFIX))));

/// Locate every protected value, left to right
pub fn find_occurrences(text: &str) -> TemplateResult<Vec<Occurrence>> {
    let re = PROTECTED_VALUE
        .as_ref()
        .map_err(|e| TemplateError::config(format!("invalid protected value pattern: {}", e)))?;

    Ok(re
        .captures_iter(text)
        .enumerate()
        .filter_map(|(index, caps)| {
            let whole = caps.get(0)?;
            let payload = caps.get(1)?;
            Some(Occurrence {
                index,
                start: whole.start(),
                end: whole.end(),
                literal: whole.as_str().to_string(),
                payload: payload.as_str().to_string(),
            })
        })
        .collect())
}

/// Decrypt all protected values in `text`. Text without protected values is
/// returned unchanged without starting the pipeline.
pub async fn decrypt_protected_values(
    text: String,
    pipeline: DecryptionPipeline,
    protector: &Protector,
) -> TemplateResult<String> {
    let occurrences = find_occurrences(&text)?;
    if occurrences.is_empty() {
        return Ok(text);
    }
    tracing::debug!("Found {} protected value(s)", occurrences.len());

    let protector = protector.clone();
    let plaintexts = pipeline
        .resolve_all(&occurrences, move |payload| protector.decrypt_base64(payload))
        .await?;

    Ok(splice(&text, &occurrences, &plaintexts))
}

fn splice(text: &str, occurrences: &[Occurrence], plaintexts: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (occurrence, plaintext) in occurrences.iter().zip(plaintexts) {
        out.push_str(&text[cursor..occurrence.start]);
        out.push_str(plaintext);
        cursor = occurrence.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CipherError;
    use crate::crypto::test_support::protector;

    #[test]
    fn test_find_occurrences() {
        let text = "a: $ocm_encrypted:AAAA\nb: plain\nc: $ocm_encrypted:AAAA\n";
        let found = find_occurrences(text).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].payload, "AAAA");
        assert_eq!(found[0].literal, "$ocm_encrypted:AAAA");
        assert_eq!(found[1].index, 1);
        assert_eq!(&text[found[1].start..found[1].end], "$ocm_encrypted:AAAA");
    }

    #[test]
    fn test_marker_without_payload_is_ignored() {
        assert!(find_occurrences("a: $ocm_encrypted:\n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_occurrences_returns_text() {
        let text = "a: b\n".to_string();
        let out = decrypt_protected_values(text.clone(), DecryptionPipeline::new(4), &protector())
            .await
            .unwrap();
        assert_eq!(out, text);
    }

    #[tokio::test]
    async fn test_duplicates_each_replaced() {
        let protector = protector();
        let secret = protector.protect("s3cret").unwrap();
        let other = protector.protect("other").unwrap();
        let text = format!("a: {}\nb: {}\nc: {}\n", secret, other, secret);

        for limit in [0, 1, 2, 8] {
            let out =
                decrypt_protected_values(text.clone(), DecryptionPipeline::new(limit), &protector)
                    .await
                    .unwrap();
            assert_eq!(out, "a: s3cret\nb: other\nc: s3cret\n");
        }
    }

    #[tokio::test]
    async fn test_failure_reports_occurrence() {
        let protector = protector();
        let good = protector.protect("ok").unwrap();
        let text = format!("a: {}\nb: $ocm_encrypted:AAAA\n", good);

        let err = decrypt_protected_values(text, DecryptionPipeline::new(2), &protector)
            .await
            .unwrap_err();
        match err {
            TemplateError::Decryption { occurrence, source } => {
                assert_eq!(occurrence, "$ocm_encrypted:AAAA");
                assert_eq!(source, CipherError::InvalidPadding);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
