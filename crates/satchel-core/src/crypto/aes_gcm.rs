use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};

use super::iv::{next_nonce, IvStore};
use super::{SealOpener, NONCE_LEN, SEAL_OVERHEAD};
use crate::error::{Result, SatchelError};

/// AES-256-GCM sealer with nonces drawn from a persistent registry.
pub struct Aes256GcmSealer {
    cipher: Aes256Gcm,
    ivs: Arc<dyn IvStore>,
}

impl Aes256GcmSealer {
    pub fn new(key: &[u8; 32], ivs: Arc<dyn IvStore>) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key).expect("valid 32-byte key for AES-256-GCM");
        Self { cipher, ivs }
    }
}

impl SealOpener for Aes256GcmSealer {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let nonce_bytes = next_nonce(self.ivs.as_ref())?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SatchelError::Other(format!("AES-GCM encrypt: {e}")))?;

        // Wire format: [12-byte nonce][ciphertext with appended 16-byte tag]
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data.len() < SEAL_OVERHEAD {
            return Err(SatchelError::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| SatchelError::DecryptionFailed)
    }
}
