use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::AppError;

const NONCE_LEN: usize = 12;

/// At-rest sealing for text bodies with AES-256-GCM. Stored form is
/// base64(nonce || ciphertext). Attachment metadata is never sealed.
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl EncryptionService {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&master_key)),
        }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, AppError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Encryption(e.to_string()))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Values that fail to authenticate as ciphertext are returned verbatim:
    /// rows written before sealing was introduced stay readable, and a failed
    /// decrypt is indistinguishable from "always was plaintext".
    pub fn open(&self, stored: &str) -> String {
        match self.try_open(stored) {
            Some(plaintext) => plaintext,
            None => stored.to_string(),
        }
    }

    fn try_open(&self, stored: &str) -> Option<String> {
        let raw = STANDARD.decode(stored.trim()).ok()?;
        if raw.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }
}
