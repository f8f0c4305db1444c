use serde::{Deserialize, Serialize};

use crate::crypto::SealOpener;
use crate::error::Result;

/// User-facing document metadata: an ordered, deduplicated tag list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Metadata {
    pub fn new(tags: &[String]) -> Self {
        let mut meta = Metadata::default();
        meta.add_tags(tags);
        meta
    }

    /// Append tags that are not already present, preserving first-seen
    /// order. Returns true if the list was extended.
    pub fn add_tags(&mut self, tags: &[String]) -> bool {
        let mut extended = false;
        for tag in tags {
            if self.tags.iter().any(|t| t == tag) {
                continue;
            }
            self.tags.push(tag.clone());
            extended = true;
        }
        extended
    }

    /// Drop all tags. A re-upload resets cached tags before re-applying the
    /// pushed set, so a reduced tag list replaces rather than unions.
    pub fn clear_tags(&mut self) {
        self.tags.clear();
    }
}

/// On-the-wire metadata envelope; the sealed payload the server stores.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataEnvelope {
    satchel: Metadata,
}

/// Serialize and seal metadata for storage.
pub fn seal_metadata(sealer: &dyn SealOpener, meta: &Metadata) -> Result<Vec<u8>> {
    let envelope = MetadataEnvelope {
        satchel: meta.clone(),
    };
    let plain = rmp_serde::to_vec(&envelope)?;
    sealer.seal(&plain)
}

/// Open and deserialize a stored metadata blob. The empty blob stands for
/// absent metadata.
pub fn open_metadata(opener: &dyn SealOpener, blob: &[u8]) -> Result<Metadata> {
    if blob.is_empty() {
        return Ok(Metadata::default());
    }
    let plain = opener.open(blob)?;
    let envelope: MetadataEnvelope = rmp_serde::from_slice(&plain)?;
    Ok(envelope.satchel)
}
