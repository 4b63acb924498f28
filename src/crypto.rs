//! Field-level encryption for personal data.
//!
//! Values are sealed with XChaCha20-Poly1305 under a 256-bit key. Each
//! ciphertext carries its own random 24-byte nonce and is stored as
//! `base64(nonce || ciphertext || tag)`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use thiserror::Error;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

const KDF_SALT: &[u8] = b"storefront-field-encryption";
const DEV_PASSPHRASE: &[u8] = b"storefront-development-only";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encrypt,
    #[error("ciphertext is malformed")]
    Malformed,
    #[error("decryption failed")]
    Decrypt,
}

impl From<CryptoError> for crate::EcommerceError {
    fn from(e: CryptoError) -> Self {
        tracing::error!(error = %e, "field encryption failure");
        Self::Crypto
    }
}

pub struct FieldCipher {
    cipher: XChaCha20Poly1305,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("FieldCipher(..)") }
}

impl FieldCipher {
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { cipher: XChaCha20Poly1305::new(Key::from_slice(key)) }
    }

    /// A base64 32-byte key is used as is; any other string is treated as a
    /// passphrase and stretched with Argon2id. Without a configured key a
    /// fixed development key is derived.
    pub fn from_config(configured: Option<&str>) -> Result<Self, CryptoError> {
        match configured {
            Some(value) => match STANDARD.decode(value) {
                Ok(bytes) if bytes.len() == KEY_SIZE => {
                    let mut key = [0u8; KEY_SIZE];
                    key.copy_from_slice(&bytes);
                    Ok(Self::new(&key))
                }
                _ => Ok(Self::new(&derive_key(value.as_bytes())?)),
            },
            None => {
                tracing::warn!("ENCRYPTION_KEY not set; using a development key for personal data");
                Ok(Self::new(&derive_key(DEV_PASSPHRASE)?))
            }
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ct = self.cipher.encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes()).map_err(|_| CryptoError::Encrypt)?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ct.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        let raw = STANDARD.decode(sealed).map_err(|_| CryptoError::Malformed)?;
        if raw.len() <= NONCE_SIZE { return Err(CryptoError::Malformed); }
        let (nonce, ct) = raw.split_at(NONCE_SIZE);
        let pt = self.cipher.decrypt(XNonce::from_slice(nonce), ct).map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(pt).map_err(|_| CryptoError::Malformed)
    }

    pub fn encrypt_opt(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        value.filter(|v| !v.is_empty()).map(|v| self.encrypt(v)).transpose()
    }

    pub fn decrypt_opt(&self, value: Option<&str>) -> Result<Option<String>, CryptoError> {
        value.map(|v| self.decrypt(v)).transpose()
    }
}

fn derive_key(passphrase: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut key = [0u8; KEY_SIZE];
    argon2::Argon2::default().hash_password_into(passphrase, KDF_SALT, &mut key).map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher { FieldCipher::new(&[7u8; KEY_SIZE]) }

    #[test]
    fn test_round_trip_uses_fresh_nonces() {
        let c = cipher();
        let a = c.encrypt("42 Elm Street").unwrap();
        let b = c.encrypt("42 Elm Street").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), "42 Elm Street");
    }

    #[test]
    fn test_tampering_and_wrong_key_fail() {
        let sealed = cipher().encrypt("555-0100").unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 1;
        assert_eq!(cipher().decrypt(&STANDARD.encode(raw)), Err(CryptoError::Decrypt));
        assert_eq!(FieldCipher::new(&[8u8; KEY_SIZE]).decrypt(&sealed), Err(CryptoError::Decrypt));
        assert_eq!(cipher().decrypt("not base64!"), Err(CryptoError::Malformed));
    }

    #[test]
    fn test_key_from_config() {
        let key = STANDARD.encode([7u8; KEY_SIZE]);
        let c = FieldCipher::from_config(Some(&key)).unwrap();
        let sealed = cipher().encrypt("tax-123").unwrap();
        assert_eq!(c.decrypt(&sealed).unwrap(), "tax-123");
        let p1 = FieldCipher::from_config(Some("correct horse battery staple")).unwrap();
        let p2 = FieldCipher::from_config(Some("correct horse battery staple")).unwrap();
        assert_eq!(p2.decrypt(&p1.encrypt("x").unwrap()).unwrap(), "x");
    }

    #[test]
    fn test_optional_values() {
        let c = cipher();
        assert_eq!(c.encrypt_opt(None).unwrap(), None);
        assert_eq!(c.encrypt_opt(Some("")).unwrap(), None);
        let sealed = c.encrypt_opt(Some("a")).unwrap();
        assert_eq!(c.decrypt_opt(sealed.as_deref()).unwrap().as_deref(), Some("a"));
    }
}
