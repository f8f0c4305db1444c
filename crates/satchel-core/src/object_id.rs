use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SatchelError};

/// A 12-byte object identifier. The 24-char hex form doubles as the opaque
/// server name a file is stored under; a fresh id is minted on every full
/// upload so server names rotate with the content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    /// Mint a new id from OS entropy.
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        ObjectId(bytes)
    }

    /// Hex-encode the id for use as a server name or storage key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 24-char hex server name back into an id.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|_| SatchelError::InvalidFormat(format!("invalid object id hex '{s}'")))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| SatchelError::InvalidFormat(format!("object id '{s}' is not 12 bytes")))?;
        Ok(ObjectId(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
