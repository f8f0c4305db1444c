use rand::RngCore;

use crate::crypto::NONCE_LEN;
use crate::error::{Result, SatchelError};

/// Persistent registry of every nonce ever used under the store's key.
///
/// `insert` must reject a nonce that is already recorded so a racing
/// duplicate cannot slip past the `exists` check.
pub trait IvStore: Send + Sync {
    fn exists(&self, iv: &[u8]) -> Result<bool>;

    fn insert(&self, iv: &[u8]) -> Result<()>;
}

/// Generate a fresh random nonce and durably record it.
///
/// A collision with a previously recorded nonce retries with new entropy;
/// any other persistence failure aborts, so no plaintext is ever sealed
/// under a nonce that is not durably recorded.
pub fn next_nonce(store: &dyn IvStore) -> Result<[u8; NONCE_LEN]> {
    loop {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        if store.exists(&nonce)? {
            tracing::debug!("nonce collision, regenerating");
            continue;
        }

        match store.insert(&nonce) {
            Ok(()) => return Ok(nonce),
            // A racing writer recorded the same nonce first. Retry.
            Err(SatchelError::PolicyViolation(_)) => continue,
            Err(e) => return Err(e),
        }
    }
}
