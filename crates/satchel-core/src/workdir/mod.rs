pub mod tags;

use std::fs;
use std::io::Write;
use std::path::Path;

use rand::RngCore;
use tracing::warn;

use crate::error::{Result, SatchelError};
use crate::store::{
    new_sha, Commit, Commiter, DocumentBuffer, PullDescription, PullOptions, PushOptions, Puller,
    Pusher,
};

/// Outcome of a directory push.
#[derive(Debug, Default)]
pub struct PushSummary {
    pub pushed: usize,
    pub failed: usize,
    /// Whether the plaintext files were securely removed afterwards.
    pub swept: bool,
}

/// Outcome of a pull into a directory.
#[derive(Debug)]
pub struct PullSummary {
    pub description: PullDescription,
    pub written: usize,
}

/// Pushes the regular files of a working directory into a store.
pub struct DirPusher<'a> {
    pusher: &'a dyn Pusher,
    commiter: Option<&'a dyn Commiter>,
}

impl<'a> DirPusher<'a> {
    pub fn new(pusher: &'a dyn Pusher) -> Self {
        Self {
            pusher,
            commiter: None,
        }
    }

    /// Record a commit for every pushed file and flush them at the end.
    pub fn with_commiter(mut self, commiter: &'a dyn Commiter) -> Self {
        self.commiter = Some(commiter);
        self
    }

    /// Push a single file, folding its xattr tags into the push tags.
    pub fn push_file(&self, path: &Path, opts: &PushOptions) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SatchelError::InvalidFormat(format!("unusable file name: {path:?}")))?
            .to_string();

        let mut opts = opts.clone();
        opts.tags.extend(tags::get_tags(path));

        let mut file = fs::File::open(path)?;
        let file_id = self.pusher.push(&name, &mut file, &opts)?;

        if let Some(commiter) = self.commiter {
            commiter.add_commit(Commit {
                sha: new_sha("push"),
                namespace: String::new(),
                file_id: file_id.clone(),
            });
        }
        Ok(file_id)
    }

    /// Push every non-hidden regular file in `dir`, flush commits, and
    /// securely sweep the pushed plaintext when everything succeeded.
    pub fn push_dir(&self, dir: &Path, opts: &PushOptions) -> Result<PushSummary> {
        let mut summary = PushSummary::default();

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        for path in &paths {
            match self.push_file(path, opts) {
                Ok(_) => summary.pushed += 1,
                Err(e) => {
                    warn!("failed to push {path:?}: {e}");
                    summary.failed += 1;
                }
            }
        }

        if let Some(commiter) = self.commiter {
            commiter.flush_commits()?;
        }

        // The sweep only runs on a fully clean push: a failed file must not
        // lose its plaintext.
        if summary.failed == 0 {
            clean(dir)?;
            summary.swept = true;
        }
        Ok(summary)
    }
}

/// Drain a pull into `dir`, restoring tags onto the written files.
pub fn pull_into(dir: &Path, puller: &dyn Puller, opts: &PullOptions) -> Result<PullSummary> {
    let buffer = DocumentBuffer::new();
    let description = puller.pull(&buffer, opts)?;

    let mut written = 0;
    loop {
        match buffer.next() {
            Ok(doc) => {
                // Only the base name is honored; a document name may not
                // escape the target directory.
                let Some(base) = Path::new(&doc.name).file_name() else {
                    warn!("skipping document with unusable name {:?}", doc.name);
                    continue;
                };
                let path = dir.join(base);
                fs::write(&path, &doc.data)?;
                if !doc.metadata.tags.is_empty() {
                    tags::set_tags(&path, &doc.metadata.tags)?;
                }
                written += 1;
            }
            Err(SatchelError::EndOfDocuments) | Err(SatchelError::BufferClosed) => break,
            Err(e) => warn!("pull: document failed: {e}"),
        }
    }

    Ok(PullSummary {
        description,
        written,
    })
}

/// Securely remove every non-hidden regular file in `dir`. Returns how many
/// files were removed.
pub fn clean(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        secure_delete(&entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

/// Overwrite a file with random bytes, flush it to disk, then remove it.
fn secure_delete(path: &Path) -> Result<()> {
    let len = fs::metadata(path)?.len();

    let mut file = fs::OpenOptions::new().write(true).open(path)?;
    let mut noise = vec![0u8; len as usize];
    rand::thread_rng().fill_bytes(&mut noise);
    file.write_all(&noise)?;
    file.sync_all()?;
    drop(file);

    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Mutex;

    use super::*;
    use crate::store::ReadSeek;

    #[derive(Default)]
    struct StubStore {
        pushed: Mutex<Vec<(String, Vec<u8>)>>,
        commits: Mutex<Vec<Commit>>,
        flushes: Mutex<usize>,
        fail_on: Option<String>,
    }

    impl Pusher for StubStore {
        fn push(&self, name: &str, data: &mut dyn ReadSeek, _opts: &PushOptions) -> Result<String> {
            if self.fail_on.as_deref() == Some(name) {
                return Err(SatchelError::Other(format!("refusing to push {name}")));
            }
            let mut payload = Vec::new();
            data.read_to_end(&mut payload)?;
            self.pushed.lock().unwrap().push((name.to_string(), payload));
            Ok(format!("id-{name}"))
        }
    }

    impl Commiter for StubStore {
        fn add_commit(&self, commit: Commit) {
            self.commits.lock().unwrap().push(commit);
        }

        fn flush_commits(&self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn push_dir_commits_every_file_and_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        fs::write(dir.path().join("b.txt"), b"bbb").unwrap();
        fs::write(dir.path().join(".satchel"), b"config").unwrap();

        let store = StubStore::default();
        let summary = DirPusher::new(&store)
            .with_commiter(&store)
            .push_dir(dir.path(), &PushOptions::default())
            .unwrap();

        assert_eq!(summary.pushed, 2);
        assert_eq!(summary.failed, 0);
        assert!(summary.swept);

        let pushed = store.pushed.lock().unwrap();
        assert_eq!(pushed[0].0, "a.txt");
        assert_eq!(pushed[0].1, b"aaa");

        let commits = store.commits.lock().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].file_id, "id-a.txt");
        // Each file gets its own grouping sha.
        assert_ne!(commits[0].sha, commits[1].sha);
        assert_eq!(*store.flushes.lock().unwrap(), 1);

        // Pushed plaintext is gone; the config stays.
        assert!(!dir.path().join("a.txt").exists());
        assert!(dir.path().join(".satchel").exists());
    }

    #[test]
    fn push_dir_failure_skips_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        fs::write(dir.path().join("b.txt"), b"bbb").unwrap();

        let store = StubStore {
            fail_on: Some("b.txt".into()),
            ..Default::default()
        };
        let summary = DirPusher::new(&store)
            .push_dir(dir.path(), &PushOptions::default())
            .unwrap();

        assert_eq!(summary.pushed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.swept);
        assert!(dir.path().join("a.txt").exists());
        assert!(dir.path().join("b.txt").exists());
    }

    #[test]
    fn secure_delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        fs::write(&path, b"plaintext payload").unwrap();
        secure_delete(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn clean_skips_hidden_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join(".satchel"), b"config").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let removed = clean(dir.path()).unwrap();
        assert_eq!(removed, 2);
        assert!(dir.path().join(".satchel").exists());
        assert!(dir.path().join("subdir").exists());
        assert!(!dir.path().join("a.txt").exists());
    }
}
