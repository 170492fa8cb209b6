//! Protected values
//!
//! A protected value is a scalar rewritten to `$ocm_encrypted:<base64>`,
//! where the payload is the ciphertext produced by a [`ValueCipher`] with the
//! resolver's [`KeyMaterial`]. The block cipher itself is supplied by the
//! caller; this module owns the micro-format and the concurrent decryption
//! of every protected value in a document.

mod pipeline;

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::error::{TemplateError, TemplateResult};

pub use pipeline::{DecryptionPipeline, Occurrence};

/// Marker that introduces a protected value in a document
pub const PROTECTED_PREFIX: &str = "$ocm_encrypted:";

/// AES block size; the initialization vector must be exactly this long
pub const IV_SIZE: usize = 16;

/// Errors raised by a [`ValueCipher`] or while decoding a protected value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("the AES key is invalid")]
    InvalidKey,

    #[error("the encrypted string is invalid base64")]
    InvalidBase64,

    #[error("invalid PCKS7 padding")]
    InvalidPadding,

    #[error("the decrypted value is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0}")]
    Backend(String),
}

/// Symmetric key and initialization vector.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    key: Vec<u8>,
    iv: [u8; IV_SIZE],
}

impl KeyMaterial {
    /// Validate and build key material. The key must be non-empty and the IV
    /// exactly [`IV_SIZE`] bytes.
    pub fn new(key: impl Into<Vec<u8>>, iv: &[u8]) -> TemplateResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TemplateError::AesKeyNotSet);
        }
        let iv: [u8; IV_SIZE] = iv
            .try_into()
            .map_err(|_| TemplateError::InvalidIv { len: iv.len() })?;
        Ok(Self { key, iv })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

/// Block cipher used for protected values (AES-CBC with PKCS#7 padding in
/// production deployments).
pub trait ValueCipher: Send + Sync {
    fn encrypt(&self, key: &KeyMaterial, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    fn decrypt(&self, key: &KeyMaterial, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Shared handle to a cipher implementation
pub type SharedCipher = Arc<dyn ValueCipher>;

/// A cipher bound to key material.
#[derive(Clone)]
pub struct Protector {
    cipher: SharedCipher,
    key: KeyMaterial,
}

impl Protector {
    pub fn new(cipher: SharedCipher, key: KeyMaterial) -> Self {
        Self { cipher, key }
    }

    /// Encrypt `plaintext` into a protected value. Empty input stays empty.
    pub fn protect(&self, plaintext: &str) -> Result<String, CipherError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let ciphertext = self.cipher.encrypt(&self.key, plaintext.as_bytes())?;
        Ok(format!("{}{}", PROTECTED_PREFIX, STANDARD.encode(ciphertext)))
    }

    /// Decrypt the base64 payload of a protected value.
    pub fn decrypt_base64(&self, encoded: &str) -> Result<String, CipherError> {
        let ciphertext = STANDARD
            .decode(encoded)
            .map_err(|_| CipherError::InvalidBase64)?;
        let plaintext = self.cipher.decrypt(&self.key, &ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

impl fmt::Debug for Protector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protector").field("key", &self.key).finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Reversible stand-in for AES: XOR with the key, IV appended as a tag.
    pub(crate) struct XorCipher;

    impl ValueCipher for XorCipher {
        fn encrypt(&self, key: &KeyMaterial, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
            let mut out: Vec<u8> = plaintext
                .iter()
                .zip(key.key().iter().cycle())
                .map(|(b, k)| b ^ k)
                .collect();
            out.extend_from_slice(key.iv());
            Ok(out)
        }

        fn decrypt(&self, key: &KeyMaterial, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
            let body_len = ciphertext
                .len()
                .checked_sub(IV_SIZE)
                .ok_or(CipherError::InvalidPadding)?;
            let (body, tag) = ciphertext.split_at(body_len);
            if tag != key.iv() {
                return Err(CipherError::InvalidKey);
            }
            Ok(body
                .iter()
                .zip(key.key().iter().cycle())
                .map(|(b, k)| b ^ k)
                .collect())
        }
    }

    pub(crate) fn key_material() -> KeyMaterial {
        KeyMaterial::new(b"0123456789abcdef0123456789abcdef".to_vec(), &[7u8; IV_SIZE])
            .expect("valid key material")
    }

    pub(crate) fn protector() -> Protector {
        Protector::new(Arc::new(XorCipher), key_material())
    }
}
