pub mod local;
pub mod memory;

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::iv::IvStore;
use crate::error::{Result, SatchelError};
use crate::object_id::ObjectId;
use crate::store::Commit;

/// Default chunk size for new uploads.
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// A file record in a bucket's `files` collection.
///
/// `server_name` is the opaque 24-hex name the file is stored under (the hex
/// of the object id minted at upload time); `length` is the size of the
/// ciphertext payload; `metadata` is the sealed metadata blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: ObjectId,
    pub server_name: String,
    pub length: u64,
    pub chunk_size: u32,
    pub upload_date: DateTime<Utc>,
    pub metadata: Vec<u8>,
}

/// A document in the shared `name` collection: the sealed plaintext name of
/// a live file, keyed by the object id whose hex is the file's server name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameDoc {
    pub id: ObjectId,
    pub data: Vec<u8>,
}

/// A chunked blob bucket: file records plus their chunk streams.
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    /// Store a new file streamed from `data` and return its record.
    /// Every upload creates a fresh record id.
    fn upload(&self, server_name: &str, metadata: &[u8], data: &mut dyn Read)
        -> Result<FileRecord>;

    /// Open the chunk stream of a file for sequential reading.
    fn open_download(&self, id: &ObjectId) -> Result<Box<dyn Read + Send>>;

    /// Delete a file record and its chunks. Deleting an absent id is not an
    /// error.
    fn delete(&self, id: &ObjectId) -> Result<()>;

    /// List file records, optionally restricted to a set of server names.
    fn find(&self, server_names: Option<&[String]>) -> Result<Vec<FileRecord>>;

    /// Replace the sealed metadata blob of an existing file.
    fn patch_metadata(&self, server_name: &str, metadata: &[u8]) -> Result<()>;

    /// Server-side relocation of a file record and its chunk stream into
    /// another bucket, without the bytes passing through the client.
    fn merge_into(&self, _id: &ObjectId, _target: &str) -> Result<()> {
        Err(SatchelError::Unsupported("server-side merge".into()))
    }
}

/// The shared `name` collection.
pub trait NameStore: Send + Sync {
    fn list(&self) -> Result<Vec<NameDoc>>;

    fn insert(&self, doc: &NameDoc) -> Result<()>;

    fn delete(&self, id: &ObjectId) -> Result<()>;

    fn delete_many(&self, ids: &[ObjectId]) -> Result<()> {
        for id in ids {
            self.delete(id)?;
        }
        Ok(())
    }
}

/// The shared `commits` collection.
pub trait CommitStore: Send + Sync {
    fn insert_many(&self, commits: &[Commit]) -> Result<()>;

    fn find_by_sha(&self, sha: &str) -> Result<Vec<Commit>>;

    fn delete_by_sha(&self, sha: &str) -> Result<()>;
}

/// A connected remote host: buckets plus the shared collections.
pub trait Remote: Send + Sync {
    fn bucket(&self, name: &str) -> Result<Arc<dyn Bucket>>;

    fn names(&self) -> Arc<dyn NameStore>;

    fn initvectors(&self) -> Arc<dyn IvStore>;

    fn commits(&self) -> Arc<dyn CommitStore>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Parsed connection string.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedConn {
    /// Filesystem-backed remote rooted at a directory.
    Local { path: String },
    /// Volatile in-memory remote (tests, dry runs).
    Memory,
}

/// Parse a connection string into its backend components.
///
/// Supported formats:
/// - Bare path (`/srv/satchel`, `./relative`, `relative`) -> `Local`
/// - `file:///srv/satchel` -> `Local`
/// - `mem://` -> `Memory`
pub fn parse_conn_string(raw: &str) -> Result<ParsedConn> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SatchelError::Config(
            "connection string must not be empty".into(),
        ));
    }

    if trimmed == "mem://" {
        return Ok(ParsedConn::Memory);
    }

    if let Some(path) = trimmed.strip_prefix("file://") {
        if path.is_empty() {
            return Err(SatchelError::Config("file:// URL has empty path".into()));
        }
        return Ok(ParsedConn::Local { path: path.into() });
    }

    if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(SatchelError::Unsupported(format!(
            "connection scheme '{scheme}'"
        )));
    }

    Ok(ParsedConn::Local {
        path: trimmed.into(),
    })
}

/// Build a remote from a connection string. `db` selects a namespace on
/// remotes that support one (a subdirectory for filesystem remotes).
pub fn open_remote(conn: &str, db: Option<&str>) -> Result<Arc<dyn Remote>> {
    match parse_conn_string(conn)? {
        ParsedConn::Local { path } => {
            let root = match db {
                Some(db) => {
                    if db.contains('/') || db.contains('\\') || db.starts_with('.') {
                        return Err(SatchelError::Config(format!("invalid db name '{db}'")));
                    }
                    format!("{path}/{db}")
                }
                None => path,
            };
            Ok(Arc::new(local::LocalRemote::new(&root)?))
        }
        ParsedConn::Memory => Ok(Arc::new(memory::MemoryRemote::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_are_local() {
        assert_eq!(
            parse_conn_string("/srv/satchel").unwrap(),
            ParsedConn::Local {
                path: "/srv/satchel".into()
            }
        );
        assert_eq!(
            parse_conn_string("./here").unwrap(),
            ParsedConn::Local {
                path: "./here".into()
            }
        );
    }

    #[test]
    fn file_url_is_local() {
        assert_eq!(
            parse_conn_string("file:///srv/satchel").unwrap(),
            ParsedConn::Local {
                path: "/srv/satchel".into()
            }
        );
    }

    #[test]
    fn mem_scheme() {
        assert_eq!(parse_conn_string("mem://").unwrap(), ParsedConn::Memory);
    }

    #[test]
    fn unsupported_scheme_rejected() {
        let err = parse_conn_string("ftp://host/path").unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn empty_conn_rejected() {
        assert!(parse_conn_string("   ").is_err());
    }

    #[test]
    fn db_selects_a_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let conn = format!("file://{}", dir.path().display());
        open_remote(&conn, Some("work")).unwrap();
        assert!(dir.path().join("work").is_dir());

        assert!(open_remote(&conn, Some("../escape")).is_err());
        assert!(open_remote(&conn, Some(".hidden")).is_err());
    }
}
