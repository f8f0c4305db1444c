use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::{Bucket, CommitStore, FileRecord, NameDoc, NameStore, Remote, DEFAULT_CHUNK_SIZE};
use crate::crypto::iv::IvStore;
use crate::error::{Result, SatchelError};
use crate::object_id::ObjectId;
use crate::store::Commit;

/// In-memory remote. Thread-safe via mutexes; volatile by design.
///
/// Backs the test suite and dry runs. Supports injecting transient server
/// errors into uploads to exercise retry policies.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<RemoteState>,
}

#[derive(Default)]
struct RemoteState {
    buckets: Mutex<HashMap<String, BucketData>>,
    names: Mutex<HashMap<ObjectId, Vec<u8>>>,
    ivs: Mutex<HashSet<Vec<u8>>>,
    commits: Mutex<Vec<Commit>>,
    upload_faults: Mutex<VecDeque<i32>>,
}

#[derive(Default)]
struct BucketData {
    files: HashMap<ObjectId, FileRecord>,
    chunks: HashMap<ObjectId, Vec<u8>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue server error codes; each subsequent upload consumes one and
    /// fails with it before touching any state.
    pub fn inject_upload_faults(&self, codes: &[i32]) {
        self.state.upload_faults.lock().unwrap().extend(codes);
    }

    /// Number of recorded nonces.
    pub fn iv_count(&self) -> usize {
        self.state.ivs.lock().unwrap().len()
    }

    /// Number of live name docs.
    pub fn name_doc_count(&self) -> usize {
        self.state.names.lock().unwrap().len()
    }

    /// Number of file records in a bucket.
    pub fn file_count(&self, bucket: &str) -> usize {
        self.state
            .buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|b| b.files.len())
            .unwrap_or(0)
    }
}

impl Remote for MemoryRemote {
    fn bucket(&self, name: &str) -> Result<Arc<dyn Bucket>> {
        self.state
            .buckets
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(Arc::new(MemoryBucket {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        }))
    }

    fn names(&self) -> Arc<dyn NameStore> {
        Arc::new(MemoryNames {
            state: Arc::clone(&self.state),
        })
    }

    fn initvectors(&self) -> Arc<dyn IvStore> {
        Arc::new(MemoryIvs {
            state: Arc::clone(&self.state),
        })
    }

    fn commits(&self) -> Arc<dyn CommitStore> {
        Arc::new(MemoryCommits {
            state: Arc::clone(&self.state),
        })
    }
}

struct MemoryBucket {
    state: Arc<RemoteState>,
    name: String,
}

impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(
        &self,
        server_name: &str,
        metadata: &[u8],
        data: &mut dyn Read,
    ) -> Result<FileRecord> {
        if let Some(code) = self.state.upload_faults.lock().unwrap().pop_front() {
            return Err(SatchelError::Server {
                code,
                message: "injected transient fault".into(),
            });
        }

        let mut payload = Vec::new();
        data.read_to_end(&mut payload)?;

        let record = FileRecord {
            id: ObjectId::new(),
            server_name: server_name.to_string(),
            length: payload.len() as u64,
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_date: Utc::now(),
            metadata: metadata.to_vec(),
        };

        let mut buckets = self.state.buckets.lock().unwrap();
        let bucket = buckets.entry(self.name.clone()).or_default();
        bucket.chunks.insert(record.id, payload);
        bucket.files.insert(record.id, record.clone());
        Ok(record)
    }

    fn open_download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>> {
        let buckets = self.state.buckets.lock().unwrap();
        let bucket = buckets
            .get(&self.name)
            .ok_or_else(|| SatchelError::FileNotFound(id.to_hex()))?;
        let payload = bucket
            .chunks
            .get(id)
            .cloned()
            .ok_or_else(|| SatchelError::FileNotFound(id.to_hex()))?;
        Ok(Box::new(Cursor::new(payload)))
    }

    fn delete(&self, id: &ObjectId) -> Result<()> {
        let mut buckets = self.state.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get_mut(&self.name) {
            bucket.files.remove(id);
            bucket.chunks.remove(id);
        }
        Ok(())
    }

    fn find(&self, server_names: Option<&[String]>) -> Result<Vec<FileRecord>> {
        let buckets = self.state.buckets.lock().unwrap();
        let Some(bucket) = buckets.get(&self.name) else {
            return Ok(Vec::new());
        };
        let records = bucket
            .files
            .values()
            .filter(|r| match server_names {
                Some(names) => names.iter().any(|n| *n == r.server_name),
                None => true,
            })
            .cloned()
            .collect();
        Ok(records)
    }

    fn patch_metadata(&self, server_name: &str, metadata: &[u8]) -> Result<()> {
        let mut buckets = self.state.buckets.lock().unwrap();
        let bucket = buckets
            .get_mut(&self.name)
            .ok_or_else(|| SatchelError::FileNotFound(server_name.to_string()))?;
        let record = bucket
            .files
            .values_mut()
            .find(|r| r.server_name == server_name)
            .ok_or_else(|| SatchelError::FileNotFound(server_name.to_string()))?;
        record.metadata = metadata.to_vec();
        Ok(())
    }

    fn merge_into(&self, id: &ObjectId, target: &str) -> Result<()> {
        let mut buckets = self.state.buckets.lock().unwrap();
        let source = buckets
            .get_mut(&self.name)
            .ok_or_else(|| SatchelError::FileNotFound(id.to_hex()))?;
        let record = source
            .files
            .remove(id)
            .ok_or_else(|| SatchelError::FileNotFound(id.to_hex()))?;
        let chunks = source.chunks.remove(id).unwrap_or_default();

        let dest = buckets.entry(target.to_string()).or_default();
        dest.files.insert(record.id, record);
        dest.chunks.insert(*id, chunks);
        Ok(())
    }
}

struct MemoryNames {
    state: Arc<RemoteState>,
}

impl NameStore for MemoryNames {
    fn list(&self) -> Result<Vec<NameDoc>> {
        let names = self.state.names.lock().unwrap();
        Ok(names
            .iter()
            .map(|(id, data)| NameDoc {
                id: *id,
                data: data.clone(),
            })
            .collect())
    }

    fn insert(&self, doc: &NameDoc) -> Result<()> {
        let mut names = self.state.names.lock().unwrap();
        if names.contains_key(&doc.id) {
            return Err(SatchelError::Server {
                code: 11000,
                message: format!("duplicate name doc id {}", doc.id),
            });
        }
        names.insert(doc.id, doc.data.clone());
        Ok(())
    }

    fn delete(&self, id: &ObjectId) -> Result<()> {
        self.state.names.lock().unwrap().remove(id);
        Ok(())
    }
}

struct MemoryIvs {
    state: Arc<RemoteState>,
}

impl IvStore for MemoryIvs {
    fn exists(&self, iv: &[u8]) -> Result<bool> {
        Ok(self.state.ivs.lock().unwrap().contains(iv))
    }

    fn insert(&self, iv: &[u8]) -> Result<()> {
        if !self.state.ivs.lock().unwrap().insert(iv.to_vec()) {
            return Err(SatchelError::PolicyViolation(
                "initialization vector already recorded".into(),
            ));
        }
        Ok(())
    }
}

struct MemoryCommits {
    state: Arc<RemoteState>,
}

impl CommitStore for MemoryCommits {
    fn insert_many(&self, commits: &[Commit]) -> Result<()> {
        self.state
            .commits
            .lock()
            .unwrap()
            .extend(commits.iter().cloned());
        Ok(())
    }

    fn find_by_sha(&self, sha: &str) -> Result<Vec<Commit>> {
        let commits = self.state.commits.lock().unwrap();
        Ok(commits.iter().filter(|c| c.sha == sha).cloned().collect())
    }

    fn delete_by_sha(&self, sha: &str) -> Result<()> {
        self.state.commits.lock().unwrap().retain(|c| c.sha != sha);
        Ok(())
    }
}
