pub mod document;
pub mod engine;
pub mod metadata;
pub mod migrate;
pub mod name_index;

use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blake2::{Blake2b, Digest};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::crypto::iv::IvStore;
use crate::crypto::SealOpener;
use crate::error::{Result, SatchelError};
pub use document::{Document, DocumentBuffer};
pub use engine::Store;
pub use metadata::Metadata;
pub use migrate::Migrator;
pub use name_index::NameIndex;

/// Default number of documents a pull samples from the matches.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Default number of download workers.
pub const DEFAULT_WORKERS: usize = 1;

/// Server error codes retried by default ("failed to satisfy read
/// preference").
pub const DEFAULT_TRANSIENT_CODES: &[i32] = &[133];

/// Readable and seekable input for push operations.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Cooperative cancellation token threaded through long-running operations.
/// Cancelling aborts in-flight transfers at the next suspension point;
/// documents already delivered to a buffer stay visible.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SatchelError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Per-file progress event. Senders are non-blocking: events are dropped on
/// backpressure rather than stalling a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct NameProgress {
    pub name: String,
    pub percent: f64,
}

/// Retry policy for transient server errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum upload attempts. Zero is treated as a single attempt.
    pub max_retries: u32,
    /// Server error codes considered transient.
    pub transient_codes: Vec<i32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            transient_codes: DEFAULT_TRANSIENT_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn is_transient(&self, err: &SatchelError) -> bool {
        err.server_code()
            .map(|code| self.transient_codes.contains(&code))
            .unwrap_or(false)
    }
}

/// Retry `f` on transient server errors with a linearly increasing backoff
/// of at least one second between attempts.
pub(crate) fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = policy.max_retries.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 {
            std::thread::sleep(Duration::from_secs(u64::from(attempt - 1)));
        }
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if policy.is_transient(&e) && attempt < attempts => {
                tracing::warn!(
                    "{what}: transient server error (attempt {attempt}/{attempts}), retrying: {e}"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap())
}

/// Options for a push operation.
#[derive(Clone, Default)]
pub struct PushOptions {
    /// Tags to associate with the document.
    pub tags: Vec<String>,
    /// Encryption capability. Required on encrypted stores.
    pub sealer: Option<Arc<dyn SealOpener>>,
    /// Filter expression; used by migration to select documents server-side.
    pub filter: String,
    pub retry: RetryPolicy,
    pub progress: Option<Sender<NameProgress>>,
    pub cancel: CancelToken,
}

/// Options for a pull operation.
#[derive(Clone, Default)]
pub struct PullOptions {
    /// Number of documents to sample from the matches (0 = default 5).
    pub sample_size: usize,
    pub filter: String,
    pub sealer: Option<Arc<dyn SealOpener>>,
    /// Number of download workers (0 = default 1).
    pub workers: usize,
    /// Replace pulled filenames with fresh UUIDs.
    pub mask_name: bool,
    /// Report counts and sizes without downloading anything.
    pub describe_only: bool,
    /// Include per-file descriptions alongside the counts.
    pub describe_files_only: bool,
    pub progress: Option<Sender<NameProgress>>,
    pub cancel: CancelToken,
}

/// Synchronous summary of a pull.
#[derive(Debug, Clone, Default)]
pub struct PullDescription {
    pub count: usize,
    /// Total plaintext bytes of the chosen documents.
    pub size: u64,
    pub file_descriptions: Vec<FileDescription>,
}

#[derive(Debug, Clone)]
pub struct FileDescription {
    pub name: String,
    pub size: u64,
}

/// A commit record grouping pushed file ids under an opaque sha token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub namespace: String,
    /// The opaque server name the file was uploaded under.
    pub file_id: String,
}

/// Generate a fresh opaque sha token from a name and random entropy.
pub fn new_sha(name: &str) -> String {
    let mut hasher = Blake2b::<blake2::digest::consts::U32>::new();
    hasher.update(name.as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

/// Pushing documents into a bucket.
pub trait Pusher: Send + Sync {
    /// Push a named document, returning the opaque server name it is stored
    /// under.
    fn push(&self, name: &str, data: &mut dyn ReadSeek, opts: &PushOptions) -> Result<String>;
}

/// Pulling documents out of a bucket.
pub trait Puller: Send + Sync {
    /// Retrieve documents into `buffer` asynchronously; the description is
    /// returned synchronously.
    fn pull(&self, buffer: &DocumentBuffer, opts: &PullOptions) -> Result<PullDescription>;
}

/// Buffering and flushing commit records.
pub trait Commiter: Send + Sync {
    fn add_commit(&self, commit: Commit);

    fn flush_commits(&self) -> Result<()>;
}

/// Reverting pushes by commit sha.
pub trait Reverter: Send + Sync {
    /// Delete every file referenced by commits sharing `sha`. Destructive
    /// and non-reversible.
    fn revert(&self, sha: &str) -> Result<()>;
}

/// Access to the store's nonce registry.
pub trait IvManaged: Send + Sync {
    fn initvectors(&self) -> Arc<dyn IvStore>;
}

/// Releasing the store's connection.
pub trait Closer: Send + Sync {
    fn close(&self) -> Result<()>;
}
