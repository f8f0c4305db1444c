use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use tracing::debug;

use super::engine::{find_files, require_sealer};
use super::metadata::seal_metadata;
use super::name_index::NameIndex;
use super::{with_retry, NameProgress, PullOptions, PushOptions, Pusher, ReadSeek};
use crate::crypto::SEAL_OVERHEAD;
use crate::error::{Result, SatchelError};
use crate::progress::ProgressReader;
use crate::remote::{Bucket, NameStore, Remote};

/// A pusher that relocates files from a source bucket into a target bucket.
///
/// When a file's data has not changed, the record and its chunk stream move
/// server-side without the bytes passing through the client. Otherwise the
/// ciphertext is downloaded (never decrypted), the metadata is re-sealed
/// with the merged tag set, and the file is re-uploaded to the target under
/// the same opaque server name.
pub struct Migrator {
    src: Arc<dyn Bucket>,
    target_name: String,
    target: Arc<dyn Bucket>,
    names: Arc<dyn NameStore>,
    index: Mutex<NameIndex>,
}

impl Migrator {
    /// Connect a migrator between two buckets on the same remote.
    pub fn open(remote: Arc<dyn Remote>, src: &str, target: &str) -> Result<Self> {
        Ok(Self {
            src: remote.bucket(src)?,
            target: remote.bucket(target)?,
            target_name: target.to_string(),
            names: remote.names(),
            index: Mutex::new(NameIndex::new()),
        })
    }

    fn report(progress: Option<&Sender<NameProgress>>, name: &str, percent: f64) {
        if let Some(progress) = progress {
            let _ = progress.try_send(NameProgress {
                name: name.to_string(),
                percent,
            });
        }
    }
}

impl Pusher for Migrator {
    fn push(&self, name: &str, data: &mut dyn ReadSeek, opts: &PushOptions) -> Result<String> {
        let sealer = require_sealer(&opts.sealer)?;
        opts.cancel.check()?;

        let mut index = self.index.lock().unwrap();
        index.load(self.src.as_ref(), self.names.as_ref(), sealer.as_ref())?;

        Self::report(opts.progress.as_ref(), name, 0.0);

        // Filter-driven migration: the data did not change, so every match
        // relocates server-side by id.
        if !opts.filter.trim().is_empty() {
            let pull_opts = PullOptions {
                sample_size: usize::MAX,
                filter: opts.filter.clone(),
                ..Default::default()
            };
            let files = find_files(&index, self.src.as_ref(), &pull_opts)?;
            debug!(count = files.len(), target = %self.target_name, "bulk migrate");
            for record in &files {
                opts.cancel.check()?;
                self.src.merge_into(&record.id, &self.target_name)?;
                index.remove_by_server_name(&record.server_name);
            }
            Self::report(opts.progress.as_ref(), name, 100.0);
            return Ok(String::new());
        }

        let Some(entry) = index.entry(name).cloned() else {
            return Err(SatchelError::FileNotFound(name.to_string()));
        };

        let stream_len = data.seek(SeekFrom::End(0))?;
        let no_data_change =
            entry.record.length as i64 - SEAL_OVERHEAD as i64 == stream_len as i64;

        let mut meta = entry.metadata.clone();
        let no_tag_change = !meta.add_tags(&opts.tags);

        if no_data_change && no_tag_change {
            self.src.merge_into(&entry.record.id, &self.target_name)?;
        } else {
            // Merged tags re-seal; the blob bytes move without decryption.
            let sealed_meta = seal_metadata(sealer.as_ref(), &meta)?;

            let mut stream = self.src.open_download(&entry.record.id)?;
            let mut ciphertext = Vec::with_capacity(entry.record.length as usize);
            stream.read_to_end(&mut ciphertext)?;

            with_retry(&opts.retry, "migrate upload", || {
                opts.cancel.check()?;
                match &opts.progress {
                    Some(progress) => {
                        let mut reader = ProgressReader::new(
                            Cursor::new(&ciphertext),
                            ciphertext.len() as u64,
                            name,
                            progress.clone(),
                        );
                        self.target
                            .upload(&entry.record.server_name, &sealed_meta, &mut reader)
                    }
                    None => {
                        let mut reader = Cursor::new(&ciphertext);
                        self.target
                            .upload(&entry.record.server_name, &sealed_meta, &mut reader)
                    }
                }
            })?;

            self.src.delete(&entry.record.id)?;
        }

        index.remove_by_server_name(&entry.record.server_name);
        Self::report(opts.progress.as_ref(), name, 100.0);
        Ok(entry.record.server_name)
    }
}
