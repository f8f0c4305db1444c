use std::sync::Arc;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};

use super::iv::{next_nonce, IvStore};
use super::{SealOpener, NONCE_LEN, SEAL_OVERHEAD};
use crate::error::{Result, SatchelError};

/// ChaCha20-Poly1305 sealer. Same wire format and nonce discipline as the
/// AES-GCM engine; useful on hardware without AES acceleration.
pub struct ChaCha20Poly1305Sealer {
    cipher: ChaCha20Poly1305,
    ivs: Arc<dyn IvStore>,
}

impl ChaCha20Poly1305Sealer {
    pub fn new(key: &[u8; 32], ivs: Arc<dyn IvStore>) -> Self {
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .expect("valid 32-byte key for ChaCha20-Poly1305");
        Self { cipher, ivs }
    }
}

impl SealOpener for ChaCha20Poly1305Sealer {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let nonce_bytes = next_nonce(self.ivs.as_ref())?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SatchelError::Other(format!("ChaCha20-Poly1305 encrypt: {e}")))?;

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
