pub mod aes_gcm;
pub mod chacha20_poly1305;
pub mod iv;

use crate::error::Result;

/// Nonce length prepended to every sealed payload.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended by the AEAD.
pub const TAG_LEN: usize = 16;

/// Fixed per-payload overhead: `nonce || ciphertext || tag`.
pub const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Authenticated encryption over a single key.
///
/// `seal` returns `[12-byte nonce][ciphertext with appended 16-byte tag]`;
/// `open` reverses it. Nonces come from the engine's [`iv::IvStore`] and are
/// durably recorded before any ciphertext is produced under them.
///
/// Empty plaintext passes through unchanged in both directions, so absent
/// metadata never produces AEAD output.
pub trait SealOpener: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn open(&self, data: &[u8]) -> Result<Vec<u8>>;
}
