use std::io::Cursor;
use std::sync::Arc;

use satchel_core::crypto::aes_gcm::Aes256GcmSealer;
use satchel_core::crypto::SealOpener;
use satchel_core::error::SatchelError;
use satchel_core::remote::local::LocalRemote;
use satchel_core::remote::memory::MemoryRemote;
use satchel_core::remote::Remote;
use satchel_core::store::{
    Commit, Commiter, Document, DocumentBuffer, Migrator, PullOptions, PushOptions, Puller,
    Pusher, Reverter, RetryPolicy, Store,
};

const KEY: [u8; 32] = [0x6b; 32];

fn sealer_for(remote: &dyn Remote) -> Arc<dyn SealOpener> {
    Arc::new(Aes256GcmSealer::new(&KEY, remote.initvectors()))
}

fn push_opts(sealer: &Arc<dyn SealOpener>, tags: &[&str]) -> PushOptions {
    PushOptions {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        sealer: Some(Arc::clone(sealer)),
        ..Default::default()
    }
}

fn push(store: &Store, sealer: &Arc<dyn SealOpener>, name: &str, data: &[u8], tags: &[&str]) -> String {
    store
        .push(
            name,
            &mut Cursor::new(data.to_vec()),
            &push_opts(sealer, tags),
        )
        .unwrap()
}

/// Pull with the given options and drain the buffer to completion.
fn pull_with(store: &Store, sealer: &Arc<dyn SealOpener>, mut opts: PullOptions) -> Vec<Document> {
    opts.sealer = Some(Arc::clone(sealer));
    if opts.sample_size == 0 {
        opts.sample_size = 1000;
    }

    let buffer = DocumentBuffer::new();
    store.pull(&buffer, &opts).unwrap();

    let mut docs = Vec::new();
    loop {
        match buffer.next() {
            Ok(doc) => docs.push(doc),
            Err(SatchelError::EndOfDocuments) => break,
            Err(e) => panic!("unexpected pull error: {e}"),
        }
    }
    docs.sort_by(|a, b| a.name.cmp(&b.name));
    docs
}

fn pull_all(store: &Store, sealer: &Arc<dyn SealOpener>) -> Vec<Document> {
    pull_with(store, sealer, PullOptions::default())
}

fn memory_store() -> (Store, MemoryRemote, Arc<dyn SealOpener>) {
    let remote = MemoryRemote::new();
    let sealer = sealer_for(&remote);
    let store = Store::open(Arc::new(remote.clone()), "bucketOne").unwrap();
    (store, remote, sealer)
}

#[test]
fn single_file_round_trip() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);

    let docs = pull_all(&store, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "file1.txt");
    assert_eq!(docs[0].data, b"hello world!");
    assert_eq!(docs[0].metadata.tags, vec!["tag1"]);
}

#[test]
fn retag_extends_the_tag_set() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1", "tag2"]);

    let docs = pull_all(&store, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].metadata.tags, vec!["tag1", "tag2"]);
}

#[test]
fn reduced_tag_set_replaces_instead_of_unioning() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1", "tag2"]);
    let docs = pull_all(&store, &sealer);
    assert_eq!(docs[0].metadata.tags, vec!["tag1", "tag2"]);

    push(&store, &sealer, "file1.txt", b"hello world!", &["tag3"]);
    let docs = pull_all(&store, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].metadata.tags, vec!["tag3"]);
}

#[test]
fn filter_by_name_regex() {
    let (store, _, sealer) = memory_store();
    for name in ["file1", "file2", "file3"] {
        push(&store, &sealer, name, name.as_bytes(), &[]);
    }

    let docs = pull_with(
        &store,
        &sealer,
        PullOptions {
            filter: "n =~ 'file2'".into(),
            ..Default::default()
        },
    );
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "file2");
}

#[test]
fn filter_by_size() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "small.txt", &vec![b'a'; 12], &[]);
    push(&store, &sealer, "large.txt", &vec![b'b'; 52], &[]);

    let both = pull_with(
        &store,
        &sealer,
        PullOptions {
            filter: "s <= 52".into(),
            ..Default::default()
        },
    );
    assert_eq!(both.len(), 2);

    let exact = pull_with(
        &store,
        &sealer,
        PullOptions {
            filter: "s == 52".into(),
            ..Default::default()
        },
    );
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].name, "large.txt");
    assert_eq!(exact[0].data.len(), 52);
}

#[test]
fn filter_matching_nothing_is_empty_with_eof() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"data", &[]);

    let buffer = DocumentBuffer::new();
    let desc = store
        .pull(
            &buffer,
            &PullOptions {
                filter: "n == 'absent'".into(),
                sealer: Some(Arc::clone(&sealer)),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(desc.count, 0);
    assert!(matches!(buffer.next(), Err(SatchelError::EndOfDocuments)));
}

#[test]
fn revert_deletes_committed_files() {
    let (store, remote, sealer) = memory_store();
    let file_id = push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);

    store.add_commit(Commit {
        sha: "feedbeef".into(),
        namespace: String::new(),
        file_id,
    });
    store.flush_commits().unwrap();

    store.revert("feedbeef").unwrap();
    assert!(pull_all(&store, &sealer).is_empty());
    assert_eq!(remote.file_count("bucketOne"), 0);
    assert_eq!(remote.name_doc_count(), 0);
}

#[test]
fn migrate_unchanged_file_keeps_data_and_tags() {
    let (store, remote, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);
    pull_all(&store, &sealer);

    let migrator = Migrator::open(Arc::new(remote.clone()), "bucketOne", "bucketTwo").unwrap();
    migrator
        .push(
            "file1.txt",
            &mut Cursor::new(b"hello world!".to_vec()),
            &push_opts(&sealer, &[]),
        )
        .unwrap();

    assert_eq!(remote.file_count("bucketOne"), 0);
    assert_eq!(remote.file_count("bucketTwo"), 1);

    let target = Store::open(Arc::new(remote.clone()), "bucketTwo").unwrap();
    let docs = pull_all(&target, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"hello world!");
    assert_eq!(docs[0].metadata.tags, vec!["tag1"]);
}

#[test]
fn migrate_merges_added_tags() {
    let (store, remote, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);

    let migrator = Migrator::open(Arc::new(remote.clone()), "bucketOne", "bucketTwo").unwrap();
    migrator
        .push(
            "file1.txt",
            &mut Cursor::new(b"hello world!".to_vec()),
            &push_opts(&sealer, &["tag2"]),
        )
        .unwrap();

    assert_eq!(remote.file_count("bucketOne"), 0);

    let target = Store::open(Arc::new(remote.clone()), "bucketTwo").unwrap();
    let docs = pull_all(&target, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"hello world!");
    assert_eq!(docs[0].metadata.tags, vec!["tag1", "tag2"]);
}

#[test]
fn migrate_by_filter_merges_every_match() {
    let (store, remote, sealer) = memory_store();
    push(&store, &sealer, "keep.txt", b"keep", &["keep"]);
    push(&store, &sealer, "move1.txt", b"one", &["move"]);
    push(&store, &sealer, "move2.txt", b"two", &["move"]);

    let migrator = Migrator::open(Arc::new(remote.clone()), "bucketOne", "bucketTwo").unwrap();
    let mut opts = push_opts(&sealer, &[]);
    opts.filter = "t('move')".into();
    migrator
        .push("", &mut Cursor::new(Vec::new()), &opts)
        .unwrap();

    assert_eq!(remote.file_count("bucketOne"), 1);
    assert_eq!(remote.file_count("bucketTwo"), 2);

    let target = Store::open(Arc::new(remote.clone()), "bucketTwo").unwrap();
    let docs = pull_all(&target, &sealer);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].name, "move1.txt");
    assert_eq!(docs[1].name, "move2.txt");
}

#[test]
fn transient_upload_errors_are_retried() {
    let (store, remote, sealer) = memory_store();
    remote.inject_upload_faults(&[133, 133]);

    let mut opts = push_opts(&sealer, &["tag1"]);
    opts.retry = RetryPolicy {
        max_retries: 3,
        ..Default::default()
    };
    store
        .push("file1.txt", &mut Cursor::new(b"hello".to_vec()), &opts)
        .unwrap();

    let docs = pull_all(&store, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"hello");
}

#[test]
fn permanent_errors_fail_without_retry() {
    let (store, remote, sealer) = memory_store();
    remote.inject_upload_faults(&[11000]);

    let mut opts = push_opts(&sealer, &[]);
    opts.retry = RetryPolicy {
        max_retries: 3,
        ..Default::default()
    };
    let err = store
        .push("file1.txt", &mut Cursor::new(b"hello".to_vec()), &opts)
        .unwrap_err();
    assert_eq!(err.server_code(), Some(11000));
}

#[test]
fn sample_size_bounds_the_pull() {
    let (store, _, sealer) = memory_store();
    for i in 0..7 {
        push(&store, &sealer, &format!("file{i}"), &vec![b'x'; i + 1], &[]);
    }

    let sampled = pull_with(
        &store,
        &sealer,
        PullOptions {
            sample_size: 3,
            ..Default::default()
        },
    );
    assert_eq!(sampled.len(), 3);

    // A sample at least as large as the matches pulls everything.
    let all = pull_with(
        &store,
        &sealer,
        PullOptions {
            sample_size: 7,
            ..Default::default()
        },
    );
    assert_eq!(all.len(), 7);
}

#[test]
fn describe_only_reports_counts_without_downloading() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"hello world!", &[]);
    push(&store, &sealer, "file2.txt", b"bye", &[]);

    let buffer = DocumentBuffer::new();
    let desc = store
        .pull(
            &buffer,
            &PullOptions {
                describe_only: true,
                sealer: Some(Arc::clone(&sealer)),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(desc.count, 2);
    assert_eq!(desc.size, 15);
    assert_eq!(desc.file_descriptions.len(), 2);
    assert!(matches!(buffer.next(), Err(SatchelError::EndOfDocuments)));
}

#[test]
fn masked_pull_hides_plaintext_names() {
    let (store, _, sealer) = memory_store();
    push(&store, &sealer, "file1.txt", b"data", &[]);

    let docs = pull_with(
        &store,
        &sealer,
        PullOptions {
            mask_name: true,
            ..Default::default()
        },
    );
    assert_eq!(docs.len(), 1);
    assert_ne!(docs[0].name, "file1.txt");
    assert!(uuid::Uuid::parse_str(&docs[0].name).is_ok());
    assert_eq!(docs[0].data, b"data");
}

#[test]
fn parallel_workers_deliver_every_document() {
    let (store, _, sealer) = memory_store();
    for i in 0..12 {
        push(
            &store,
            &sealer,
            &format!("file{i:02}"),
            format!("payload {i}").as_bytes(),
            &[],
        );
    }

    let docs = pull_with(
        &store,
        &sealer,
        PullOptions {
            workers: 4,
            ..Default::default()
        },
    );
    assert_eq!(docs.len(), 12);
    for (i, doc) in docs.iter().enumerate() {
        assert_eq!(doc.data, format!("payload {i}").as_bytes());
    }
}

#[test]
fn pull_without_a_sealer_is_a_policy_violation() {
    let (store, _, _) = memory_store();
    let buffer = DocumentBuffer::new();
    let err = store.pull(&buffer, &PullOptions::default()).unwrap_err();
    assert!(matches!(err, SatchelError::PolicyViolation(_)));
}

#[test]
fn every_seal_records_a_unique_nonce() {
    let (store, remote, sealer) = memory_store();
    // A full upload seals payload, metadata, and name: three nonces each.
    push(&store, &sealer, "file1.txt", b"data one", &["tag1"]);
    push(&store, &sealer, "file2.txt", b"data two", &["tag2"]);
    assert_eq!(remote.iv_count(), 6);
}

#[test]
fn id_rotation_keeps_one_name_doc_per_live_file() {
    let (store, remote, sealer) = memory_store();
    let first = push(&store, &sealer, "file1.txt", b"version one", &[]);
    let second = push(&store, &sealer, "file1.txt", b"version two!", &[]);

    assert_ne!(first, second);
    assert_eq!(remote.file_count("bucketOne"), 1);
    assert_eq!(remote.name_doc_count(), 1);

    // A fresh engine resolves the rotated file by its plaintext name.
    let fresh = Store::open(Arc::new(remote.clone()), "bucketOne").unwrap();
    let docs = pull_all(&fresh, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"version two!");
}

#[test]
fn local_remote_round_trip_and_revert() {
    let dir = tempfile::tempdir().unwrap();
    let remote: Arc<dyn Remote> =
        Arc::new(LocalRemote::new(dir.path().to_str().unwrap()).unwrap());
    let sealer = sealer_for(remote.as_ref());

    let store = Store::open(Arc::clone(&remote), "bucketOne").unwrap();
    let file_id = push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);

    let docs = pull_all(&store, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"hello world!");
    assert_eq!(docs[0].metadata.tags, vec!["tag1"]);

    store.add_commit(Commit {
        sha: "cafe".into(),
        namespace: String::new(),
        file_id,
    });
    store.flush_commits().unwrap();
    store.revert("cafe").unwrap();

    let fresh = Store::open(Arc::clone(&remote), "bucketOne").unwrap();
    assert!(pull_all(&fresh, &sealer).is_empty());
}

#[test]
fn local_remote_fast_path_migrate() {
    let dir = tempfile::tempdir().unwrap();
    let remote: Arc<dyn Remote> =
        Arc::new(LocalRemote::new(dir.path().to_str().unwrap()).unwrap());
    let sealer = sealer_for(remote.as_ref());

    let store = Store::open(Arc::clone(&remote), "bucketOne").unwrap();
    push(&store, &sealer, "file1.txt", b"hello world!", &["tag1"]);

    let migrator = Migrator::open(Arc::clone(&remote), "bucketOne", "bucketTwo").unwrap();
    migrator
        .push(
            "file1.txt",
            &mut Cursor::new(b"hello world!".to_vec()),
            &push_opts(&sealer, &[]),
        )
        .unwrap();

    let target = Store::open(Arc::clone(&remote), "bucketTwo").unwrap();
    let docs = pull_all(&target, &sealer);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].data, b"hello world!");
    assert_eq!(docs[0].metadata.tags, vec!["tag1"]);
}
