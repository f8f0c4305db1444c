use std::collections::HashSet;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;
use rand::Rng;
use tracing::debug;

use super::document::{Document, DocumentBuffer, DocumentProducer};
use super::metadata::{seal_metadata, Metadata};
use super::name_index::{IndexEntry, NameIndex};
use super::{
    with_retry, CancelToken, Closer, Commit, Commiter, FileDescription, IvManaged, NameProgress,
    PullDescription, PullOptions, PushOptions, Puller, Pusher, ReadSeek, Reverter,
    DEFAULT_SAMPLE_SIZE, DEFAULT_WORKERS,
};
use crate::crypto::iv::IvStore;
use crate::crypto::{SealOpener, SEAL_OVERHEAD};
use crate::error::{Result, SatchelError};
use crate::filter;
use crate::object_id::ObjectId;
use crate::progress::ProgressReader;
use crate::remote::{Bucket, CommitStore, FileRecord, NameDoc, NameStore, Remote};

/// The store engine for one bucket: pushes, pulls, commits, and reverts,
/// orchestrating the crypto envelope, name index, and remote collections.
///
/// One engine serves one logical session. The name index is a lazy cache
/// loaded on first use; push and revert serialize their mutations behind
/// its lock, pull snapshots the quiescent index up front.
pub struct Store {
    remote: Arc<dyn Remote>,
    bucket: Arc<dyn Bucket>,
    bucket_name: String,
    names: Arc<dyn NameStore>,
    ivs: Arc<dyn IvStore>,
    commit_store: Arc<dyn CommitStore>,
    index: Mutex<NameIndex>,
    pending_commits: Mutex<Vec<Commit>>,
}

impl Store {
    /// Connect the engine to a bucket on the given remote.
    pub fn open(remote: Arc<dyn Remote>, bucket_name: &str) -> Result<Self> {
        let bucket = remote.bucket(bucket_name)?;
        Ok(Self {
            bucket,
            bucket_name: bucket_name.to_string(),
            names: remote.names(),
            ivs: remote.initvectors(),
            commit_store: remote.commits(),
            remote,
            index: Mutex::new(NameIndex::new()),
            pending_commits: Mutex::new(Vec::new()),
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    fn full_upload(
        &self,
        index: &mut NameIndex,
        prev: Option<&IndexEntry>,
        name: &str,
        data: &mut dyn ReadSeek,
        meta: Metadata,
        opts: &PushOptions,
    ) -> Result<String> {
        let sealer = require_sealer(&opts.sealer)?;

        data.seek(SeekFrom::Start(0))?;
        let mut plaintext = Vec::new();
        data.read_to_end(&mut plaintext)?;

        let ciphertext = sealer.seal(&plaintext)?;
        let sealed_meta = seal_metadata(sealer.as_ref(), &meta)?;

        let new_id = ObjectId::new();
        let server_name = new_id.to_hex();

        let record = with_retry(&opts.retry, "upload", || {
            opts.cancel.check()?;
            match &opts.progress {
                Some(progress) => {
                    let mut reader = ProgressReader::new(
                        Cursor::new(&ciphertext),
                        ciphertext.len() as u64,
                        name,
                        progress.clone(),
                    );
                    self.bucket.upload(&server_name, &sealed_meta, &mut reader)
                }
                None => {
                    let mut reader = Cursor::new(&ciphertext);
                    self.bucket.upload(&server_name, &sealed_meta, &mut reader)
                }
            }
        })?;

        index.insert(name, record, meta);

        // The prior version of this file, if any, is now a duplicate.
        if let Some(prev) = prev {
            self.bucket.delete(&prev.record.id)?;
            let prev_id = ObjectId::from_hex(&prev.record.server_name)?;
            self.names.delete(&prev_id)?;
            index.forget_server_name(&prev.record.server_name);
        }

        let sealed_name = sealer.seal(name.as_bytes())?;
        self.names.insert(&NameDoc {
            id: new_id,
            data: sealed_name,
        })?;

        Ok(server_name)
    }
}

impl Pusher for Store {
    fn push(&self, name: &str, data: &mut dyn ReadSeek, opts: &PushOptions) -> Result<String> {
        let sealer = require_sealer(&opts.sealer)?;
        opts.cancel.check()?;

        let mut index = self.index.lock().unwrap();
        index.load(self.bucket.as_ref(), self.names.as_ref(), sealer.as_ref())?;

        let Some(entry) = index.entry(name).cloned() else {
            let meta = Metadata::new(&opts.tags);
            return self.full_upload(&mut index, None, name, data, meta, opts);
        };

        let stream_len = data.seek(SeekFrom::End(0))?;
        let no_data_change =
            entry.record.length as i64 - SEAL_OVERHEAD as i64 == stream_len as i64;

        let mut meta = entry.metadata.clone();
        let no_tag_change = !meta.add_tags(&opts.tags);

        if no_data_change && no_tag_change {
            debug!(name, "push is a no-op");
            return Ok(entry.record.server_name.clone());
        }

        // Any rewrite resets the cached tag list before re-applying the
        // pushed set: a reduced tag set replaces rather than unions.
        let mut meta = entry.metadata.clone();
        meta.clear_tags();
        meta.add_tags(&opts.tags);

        if no_data_change {
            let sealed = seal_metadata(sealer.as_ref(), &meta)?;
            self.bucket
                .patch_metadata(&entry.record.server_name, &sealed)?;
            index.set_metadata(name, sealed, meta);
            debug!(name, "push updated tags only");
            return Ok(entry.record.server_name.clone());
        }

        // Content changed: re-upload under a fresh id.
        self.full_upload(&mut index, Some(&entry), name, data, meta, opts)
    }
}

impl Puller for Store {
    fn pull(&self, buffer: &DocumentBuffer, opts: &PullOptions) -> Result<PullDescription> {
        let sealer = require_sealer(&opts.sealer)?.clone();
        opts.cancel.check()?;

        let (files, resolution) = {
            let mut index = self.index.lock().unwrap();
            index.load(self.bucket.as_ref(), self.names.as_ref(), sealer.as_ref())?;
            let files = find_files(&index, self.bucket.as_ref(), opts)?;
            (files, index.resolution_map())
        };

        let mut desc = PullDescription {
            count: files.len(),
            ..Default::default()
        };
        for record in &files {
            let size = record.length.saturating_sub(SEAL_OVERHEAD as u64);
            desc.size += size;
            let name = resolution
                .get(&record.server_name)
                .map(|(name, _)| name.clone())
                .unwrap_or_else(|| record.server_name.clone());
            desc.file_descriptions.push(FileDescription { name, size });
        }

        let producer = buffer.producer();
        if opts.describe_only || opts.describe_files_only || files.is_empty() {
            producer.finish();
            return Ok(desc);
        }

        let count = files.len();
        let workers = if opts.workers == 0 {
            DEFAULT_WORKERS
        } else {
            opts.workers
        };

        let (file_tx, file_rx) = bounded::<FileRecord>(count);
        let (result_tx, result_rx) = bounded::<Result<Document>>(count);
        for record in files {
            file_tx
                .send(record)
                .expect("file channel sized for every record");
        }
        drop(file_tx);

        let resolution = Arc::new(resolution);
        for _ in 0..workers {
            let rx = file_rx.clone();
            let tx = result_tx.clone();
            let worker = PullWorker {
                bucket: Arc::clone(&self.bucket),
                sealer: Arc::clone(&sealer),
                resolution: Arc::clone(&resolution),
                mask_name: opts.mask_name,
                progress: opts.progress.clone(),
                cancel: opts.cancel.clone(),
            };
            thread::spawn(move || {
                for record in rx {
                    if tx.send(worker.download(&record)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(file_rx);
        drop(result_tx);

        // Drain completions into the buffer; the EOF sentinel follows the
        // last delivery exactly once.
        thread::spawn(move || {
            drain_results(result_rx, &producer);
        });

        Ok(desc)
    }
}

fn drain_results(
    result_rx: crossbeam_channel::Receiver<Result<Document>>,
    producer: &DocumentProducer,
) {
    for result in result_rx {
        match result {
            Ok(doc) => {
                if !producer.send(doc) {
                    return;
                }
            }
            Err(err) => producer.send_err(err),
        }
    }
    producer.finish();
}

struct PullWorker {
    bucket: Arc<dyn Bucket>,
    sealer: Arc<dyn SealOpener>,
    resolution: Arc<std::collections::HashMap<String, (String, Metadata)>>,
    mask_name: bool,
    progress: Option<crossbeam_channel::Sender<NameProgress>>,
    cancel: CancelToken,
}

impl PullWorker {
    fn download(&self, record: &FileRecord) -> Result<Document> {
        self.cancel.check()?;

        let Some((name, metadata)) = self.resolution.get(&record.server_name).cloned() else {
            return Err(SatchelError::InvalidFormat(format!(
                "no index entry for server name {}",
                record.server_name
            )));
        };

        self.report(&name, 0.0);

        let mut stream = self.bucket.open_download(&record.id)?;
        let mut ciphertext = Vec::with_capacity(record.length as usize);
        stream.read_to_end(&mut ciphertext)?;

        self.cancel.check()?;
        let data = self.sealer.open(&ciphertext)?;
        self.report(&name, 100.0);

        let name = if self.mask_name {
            uuid::Uuid::new_v4().to_string()
        } else {
            name
        };
        Ok(Document {
            name,
            metadata,
            data,
        })
    }

    fn report(&self, name: &str, percent: f64) {
        if let Some(progress) = &self.progress {
            let _ = progress.try_send(NameProgress {
                name: name.to_string(),
                percent,
            });
        }
    }
}

/// Resolve a pull's candidate set: client-side filter, server query over the
/// survivors, random sample, then smallest-ciphertext-first ordering so an
/// early cancellation completes as many files as possible.
pub(crate) fn find_files(
    index: &NameIndex,
    bucket: &dyn Bucket,
    opts: &PullOptions,
) -> Result<Vec<FileRecord>> {
    let docs = index.candidates();
    let filtered = filter::filter_documents(&opts.filter, &docs)?;

    let has_filter = !opts.filter.trim().is_empty();
    if filtered.is_empty() && has_filter {
        return Ok(Vec::new());
    }

    let server_names: Option<Vec<String>> = if has_filter {
        Some(filtered.into_iter().map(|d| d.encoded_name).collect())
    } else {
        None
    };
    let records = bucket.find(server_names.as_deref())?;

    let mut sample_size = if opts.sample_size == 0 {
        DEFAULT_SAMPLE_SIZE
    } else {
        opts.sample_size
    };
    if opts.describe_only || opts.describe_files_only {
        sample_size = records.len();
    }

    let mut chosen = random_subset(records, sample_size);
    chosen.sort_by_key(|r| r.length);
    Ok(chosen)
}

/// Choose a uniform random subset of `size` records.
fn random_subset(files: Vec<FileRecord>, size: usize) -> Vec<FileRecord> {
    if size >= files.len() {
        return files;
    }
    let mut rng = rand::thread_rng();
    let mut used = HashSet::new();
    let mut chosen = Vec::with_capacity(size);
    while chosen.len() < size {
        let idx = rng.gen_range(0..files.len());
        if used.insert(idx) {
            chosen.push(files[idx].clone());
        }
    }
    chosen
}

pub(crate) fn require_sealer(
    sealer: &Option<Arc<dyn SealOpener>>,
) -> Result<&Arc<dyn SealOpener>> {
    sealer.as_ref().ok_or_else(|| {
        SatchelError::PolicyViolation("encrypted store requires a seal opener".into())
    })
}

impl Commiter for Store {
    fn add_commit(&self, mut commit: Commit) {
        commit.namespace = self.bucket_name.clone();
        self.pending_commits.lock().unwrap().push(commit);
    }

    fn flush_commits(&self) -> Result<()> {
        let commits = std::mem::take(&mut *self.pending_commits.lock().unwrap());
        if commits.is_empty() {
            return Ok(());
        }
        self.commit_store.insert_many(&commits)
    }
}

impl Reverter for Store {
    fn revert(&self, sha: &str) -> Result<()> {
        let commits = self.commit_store.find_by_sha(sha)?;
        let file_names: Vec<String> = commits.into_iter().map(|c| c.file_id).collect();

        // Server names resolve to current record ids through the files
        // collection.
        let records = self.bucket.find(Some(&file_names))?;
        for record in &records {
            self.bucket.delete(&record.id)?;
        }

        let ids = file_names
            .iter()
            .map(|name| ObjectId::from_hex(name))
            .collect::<Result<Vec<_>>>()?;
        self.names.delete_many(&ids)?;
        self.commit_store.delete_by_sha(sha)?;

        let mut index = self.index.lock().unwrap();
        for name in &file_names {
            index.remove_by_server_name(name);
        }
        Ok(())
    }
}

impl IvManaged for Store {
    fn initvectors(&self) -> Arc<dyn IvStore> {
        Arc::clone(&self.ivs)
    }
}

impl Closer for Store {
    fn close(&self) -> Result<()> {
        self.remote.close()
    }
}
