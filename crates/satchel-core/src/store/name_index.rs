use std::collections::HashMap;

use tracing::debug;

use super::metadata::{open_metadata, Metadata};
use crate::crypto::SealOpener;
use crate::crypto::SEAL_OVERHEAD;
use crate::error::{Result, SatchelError};
use crate::filter;
use crate::remote::{Bucket, FileRecord, NameStore};

/// A resolved file: its server record and decrypted metadata.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub record: FileRecord,
    pub metadata: Metadata,
}

impl IndexEntry {
    /// Plaintext size of the file's payload.
    pub fn plaintext_len(&self) -> u64 {
        self.record.length.saturating_sub(SEAL_OVERHEAD as u64)
    }
}

/// Lazy in-memory index over a bucket's files.
///
/// Two maps: opaque server name -> plaintext name (from the `name`
/// collection), and plaintext name -> (record, metadata) (from the bucket's
/// files). Loaded on first use; push and revert keep the cached maps in step
/// with their server-side mutations.
#[derive(Debug, Default)]
pub struct NameIndex {
    hex_to_name: HashMap<String, String>,
    entries: HashMap<String, IndexEntry>,
    loaded: bool,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate both maps from the remote collections. A no-op when already
    /// loaded.
    pub fn load(
        &mut self,
        bucket: &dyn Bucket,
        names: &dyn NameStore,
        opener: &dyn SealOpener,
    ) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        for doc in names.list()? {
            let plain = opener.open(&doc.data)?;
            let name = String::from_utf8(plain).map_err(|_| {
                SatchelError::InvalidFormat(format!("name doc {} is not UTF-8", doc.id))
            })?;
            self.hex_to_name.insert(doc.id.to_hex(), name);
        }

        for record in bucket.find(None)? {
            let name = self.hex_to_name.get(&record.server_name).ok_or_else(|| {
                SatchelError::InvalidFormat(format!(
                    "no name doc for server name {}",
                    record.server_name
                ))
            })?;
            // Metadata that fails to open is treated as absent.
            let metadata = open_metadata(opener, &record.metadata).unwrap_or_default();
            self.entries
                .insert(name.clone(), IndexEntry { record, metadata });
        }

        self.loaded = true;
        debug!(
            files = self.entries.len(),
            bucket = bucket.name(),
            "name index loaded"
        );
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.get(name)
    }

    pub fn plaintext_of(&self, server_name: &str) -> Option<&str> {
        self.hex_to_name.get(server_name).map(String::as_str)
    }

    /// Record a freshly pushed file in both maps.
    pub fn insert(&mut self, name: &str, record: FileRecord, metadata: Metadata) {
        self.hex_to_name
            .insert(record.server_name.clone(), name.to_string());
        self.entries
            .insert(name.to_string(), IndexEntry { record, metadata });
    }

    /// Replace the cached metadata of a live file.
    pub fn set_metadata(&mut self, name: &str, sealed: Vec<u8>, metadata: Metadata) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.record.metadata = sealed;
            entry.metadata = metadata;
        }
    }

    /// Drop a stale server-name alias after an id rotation, leaving the
    /// entry under the plaintext name (which now points at the new record).
    pub fn forget_server_name(&mut self, server_name: &str) {
        self.hex_to_name.remove(server_name);
    }

    /// Drop a file by its opaque server name (revert path).
    pub fn remove_by_server_name(&mut self, server_name: &str) {
        if let Some(name) = self.hex_to_name.remove(server_name) {
            self.entries.remove(&name);
        }
    }

    /// Project the loaded files into filter candidates. Sizes are plaintext
    /// sizes.
    pub fn candidates(&self) -> Vec<filter::Document> {
        self.entries
            .iter()
            .map(|(name, entry)| filter::Document {
                encoded_name: entry.record.server_name.clone(),
                name: name.clone(),
                tags: entry.metadata.tags.clone(),
                size: entry.plaintext_len() as i64,
            })
            .collect()
    }

    /// Snapshot of server name -> (plaintext name, metadata), used by pull
    /// workers while the index is quiescent.
    pub fn resolution_map(&self) -> HashMap<String, (String, Metadata)> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                (
                    entry.record.server_name.clone(),
                    (name.clone(), entry.metadata.clone()),
                )
            })
            .collect()
    }
}
