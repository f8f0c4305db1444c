use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::{Bucket, CommitStore, FileRecord, NameDoc, NameStore, Remote, DEFAULT_CHUNK_SIZE};
use crate::crypto::iv::IvStore;
use crate::error::{Result, SatchelError};
use crate::object_id::ObjectId;
use crate::store::Commit;

const BUCKETS_DIR: &str = "buckets";
const NAMES_DIR: &str = "name";
const IVS_DIR: &str = "initvectors";
const COMMITS_DIR: &str = "commits";

/// Filesystem-backed remote rooted at a directory.
///
/// Records are MessagePack documents, chunk streams are fixed-size chunk
/// files, and nonce uniqueness rides on `create_new` marker files.
pub struct LocalRemote {
    root: PathBuf,
}

impl LocalRemote {
    pub fn new(root: &str) -> Result<Self> {
        let root_path = PathBuf::from(root);
        fs::create_dir_all(&root_path)?;
        // Canonicalize for correct behavior with symlinked roots.
        let root = fs::canonicalize(&root_path)?;
        Ok(Self { root })
    }
}

/// Reject names that could escape the remote's directory layout.
fn validate_segment(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SatchelError::InvalidFormat("unsafe storage key: empty".into()));
    }
    if name == "." || name == ".." {
        return Err(SatchelError::InvalidFormat(format!(
            "unsafe storage key: traversal '{name}'"
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(SatchelError::InvalidFormat(format!(
            "unsafe storage key: separator in '{name}'"
        )));
    }
    Ok(())
}

impl Remote for LocalRemote {
    fn bucket(&self, name: &str) -> Result<Arc<dyn Bucket>> {
        validate_segment(name)?;
        let buckets_root = self.root.join(BUCKETS_DIR);
        let dir = buckets_root.join(name);
        fs::create_dir_all(dir.join("files"))?;
        fs::create_dir_all(dir.join("chunks"))?;
        Ok(Arc::new(LocalBucket {
            buckets_root,
            dir,
            name: name.to_string(),
        }))
    }

    fn names(&self) -> Arc<dyn NameStore> {
        Arc::new(LocalNames {
            dir: self.root.join(NAMES_DIR),
        })
    }

    fn initvectors(&self) -> Arc<dyn IvStore> {
        Arc::new(LocalIvs {
            dir: self.root.join(IVS_DIR),
        })
    }

    fn commits(&self) -> Arc<dyn CommitStore> {
        Arc::new(LocalCommits {
            dir: self.root.join(COMMITS_DIR),
        })
    }
}

struct LocalBucket {
    buckets_root: PathBuf,
    dir: PathBuf,
    name: String,
}

impl LocalBucket {
    fn record_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join("files").join(id.to_hex())
    }

    fn chunk_dir(&self, id: &ObjectId) -> PathBuf {
        self.dir.join("chunks").join(id.to_hex())
    }

    fn read_record(path: &Path) -> Result<FileRecord> {
        let raw = fs::read(path)?;
        Ok(rmp_serde::from_slice(&raw)?)
    }

    fn find_by_server_name(&self, server_name: &str) -> Result<FileRecord> {
        self.find(Some(&[server_name.to_string()]))?
            .into_iter()
            .next()
            .ok_or_else(|| SatchelError::FileNotFound(server_name.to_string()))
    }
}

impl Bucket for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn upload(
        &self,
        server_name: &str,
        metadata: &[u8],
        data: &mut dyn Read,
    ) -> Result<FileRecord> {
        validate_segment(server_name)?;
        let id = ObjectId::new();
        let chunk_dir = self.chunk_dir(&id);
        fs::create_dir_all(&chunk_dir)?;

        // Chunks land first; the record document makes the file visible.
        let mut length: u64 = 0;
        let mut chunk_no: u32 = 0;
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE as usize];
        loop {
            let mut filled = 0;
            while filled < buf.len() {
                match data.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            if filled == 0 && chunk_no > 0 {
                break;
            }
            fs::write(chunk_dir.join(format!("{chunk_no:06}")), &buf[..filled])?;
            length += filled as u64;
            chunk_no += 1;
            if filled < buf.len() {
                break;
            }
        }

        let record = FileRecord {
            id,
            server_name: server_name.to_string(),
            length,
            chunk_size: DEFAULT_CHUNK_SIZE,
            upload_date: Utc::now(),
            metadata: metadata.to_vec(),
        };
        fs::write(self.record_path(&id), rmp_serde::to_vec(&record)?)?;
        Ok(record)
    }

    fn open_download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>> {
        let chunk_dir = self.chunk_dir(id);
        let mut paths: Vec<PathBuf> = match fs::read_dir(&chunk_dir) {
            Ok(entries) => entries
                .collect::<std::io::Result<Vec<_>>>()?
                .into_iter()
                .map(|e| e.path())
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SatchelError::FileNotFound(id.to_hex()))
            }
            Err(e) => return Err(e.into()),
        };
        paths.sort();
        Ok(Box::new(ChunkStreamReader {
            paths: paths.into_iter(),
            current: None,
        }))
    }

    fn delete(&self, id: &ObjectId) -> Result<()> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match fs::remove_dir_all(self.chunk_dir(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn find(&self, server_names: Option<&[String]>) -> Result<Vec<FileRecord>> {
        let files_dir = self.dir.join("files");
        let mut records = Vec::new();
        let entries = match fs::read_dir(&files_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let record = Self::read_record(&entry?.path())?;
            let keep = match server_names {
                Some(names) => names.iter().any(|n| *n == record.server_name),
                None => true,
            };
            if keep {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn patch_metadata(&self, server_name: &str, metadata: &[u8]) -> Result<()> {
        let mut record = self.find_by_server_name(server_name)?;
        record.metadata = metadata.to_vec();
        fs::write(self.record_path(&record.id), rmp_serde::to_vec(&record)?)?;
        Ok(())
    }

    fn merge_into(&self, id: &ObjectId, target: &str) -> Result<()> {
        validate_segment(target)?;
        let record_path = self.record_path(id);
        if !record_path.exists() {
            return Err(SatchelError::FileNotFound(id.to_hex()));
        }

        let target_dir = self.buckets_root.join(target);
        fs::create_dir_all(target_dir.join("files"))?;
        fs::create_dir_all(target_dir.join("chunks"))?;

        fs::rename(&record_path, target_dir.join("files").join(id.to_hex()))?;
        let chunk_dir = self.chunk_dir(id);
        if chunk_dir.exists() {
            fs::rename(&chunk_dir, target_dir.join("chunks").join(id.to_hex()))?;
        }
        Ok(())
    }
}

/// Sequential reader over a file's chunk files.
struct ChunkStreamReader {
    paths: std::vec::IntoIter<PathBuf>,
    current: Option<fs::File>,
}

impl Read for ChunkStreamReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.current.is_none() {
                match self.paths.next() {
                    Some(path) => self.current = Some(fs::File::open(path)?),
                    None => return Ok(0),
                }
            }
            let n = self.current.as_mut().unwrap().read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            self.current = None;
        }
    }
}

struct LocalNames {
    dir: PathBuf,
}

impl NameStore for LocalNames {
    fn list(&self) -> Result<Vec<NameDoc>> {
        let mut docs = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(docs),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let id = ObjectId::from_hex(&file_name.to_string_lossy())?;
            docs.push(NameDoc {
                id,
                data: fs::read(entry.path())?,
            });
        }
        Ok(docs)
    }

    fn insert(&self, doc: &NameDoc) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(doc.id.to_hex());
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SatchelError::Server {
                    code: 11000,
                    message: format!("duplicate name doc id {}", doc.id),
                })
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&doc.data)?;
        Ok(())
    }

    fn delete(&self, id: &ObjectId) -> Result<()> {
        match fs::remove_file(self.dir.join(id.to_hex())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

struct LocalIvs {
    dir: PathBuf,
}

impl IvStore for LocalIvs {
    fn exists(&self, iv: &[u8]) -> Result<bool> {
        Ok(self.dir.join(hex::encode(iv)).exists())
    }

    fn insert(&self, iv: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        // create_new is the uniqueness guarantee: a racing duplicate loses.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.dir.join(hex::encode(iv)))
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(SatchelError::PolicyViolation(
                "initialization vector already recorded".into(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

struct LocalCommits {
    dir: PathBuf,
}

impl CommitStore for LocalCommits {
    fn insert_many(&self, commits: &[Commit]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for commit in commits {
            let path = self.dir.join(ObjectId::new().to_hex());
            fs::write(path, rmp_serde::to_vec(commit)?)?;
        }
        Ok(())
    }

    fn find_by_sha(&self, sha: &str) -> Result<Vec<Commit>> {
        let mut found = Vec::new();
        for (_, commit) in self.scan()? {
            if commit.sha == sha {
                found.push(commit);
            }
        }
        Ok(found)
    }

    fn delete_by_sha(&self, sha: &str) -> Result<()> {
        for (path, commit) in self.scan()? {
            if commit.sha == sha {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl LocalCommits {
    fn scan(&self) -> Result<Vec<(PathBuf, Commit)>> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let raw = fs::read(&path)?;
            out.push((path, rmp_serde::from_slice(&raw)?));
        }
        Ok(out)
    }
}
