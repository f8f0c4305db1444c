use std::io::Cursor;
use std::sync::Arc;

use regex::Regex;
use satchel_core::error::{Result, SatchelError};
use satchel_core::remote::Remote;
use satchel_core::store::{Migrator, Pusher, PushOptions, RetryPolicy, Store};
use satchel_core::workdir::DirPusher;

use super::{open_session, require_sealer};
use crate::progress;

/// Run `satchel push [origin|migrate/<bucket>]`.
pub(crate) fn run(target: Option<String>, filter: Option<String>, retries: u32) -> Result<()> {
    let session = open_session()?;
    let sealer = require_sealer(&session.config, session.remote.initvectors())?;

    let (progress_tx, renderer) = progress::spawn_renderer();
    let opts = PushOptions {
        sealer: Some(Arc::clone(&sealer)),
        retry: RetryPolicy {
            max_retries: retries,
            ..Default::default()
        },
        progress: Some(progress_tx),
        ..Default::default()
    };

    let result = match target.as_deref() {
        None | Some("origin") => push_origin(&session, opts),
        Some(target) => push_migrate(&session, target, filter, opts),
    };

    renderer.join().ok();
    result
}

fn push_origin(session: &super::Session, opts: PushOptions) -> Result<()> {
    let store = Store::open(Arc::clone(&session.remote), session.config.bucket())?;
    let summary = DirPusher::new(&store)
        .with_commiter(&store)
        .push_dir(&session.dir, &opts)?;
    drop(opts);

    println!(
        "pushed {} file(s) to '{}' ({} failed)",
        summary.pushed,
        session.config.bucket(),
        summary.failed
    );
    if !summary.swept {
        println!("plaintext left in place: fix the failures and push again");
    }
    Ok(())
}

fn push_migrate(
    session: &super::Session,
    target: &str,
    filter: Option<String>,
    mut opts: PushOptions,
) -> Result<()> {
    let pattern = Regex::new("^migrate/[A-Za-z0-9-]+$").expect("valid migrate pattern");
    if !pattern.is_match(target) {
        return Err(SatchelError::Config(format!(
            "invalid push target '{target}' (expected origin or migrate/<bucket>)"
        )));
    }
    let bucket = target.trim_start_matches("migrate/");

    let migrator = Migrator::open(
        Arc::clone(&session.remote),
        session.config.bucket(),
        bucket,
    )?;

    if let Some(filter) = filter {
        // Server-side bulk migration of every match.
        opts.filter = filter;
        migrator.push("", &mut Cursor::new(Vec::new()), &opts)?;
        println!(
            "migrated filter matches from '{}' to '{bucket}'",
            session.config.bucket()
        );
        return Ok(());
    }

    let summary = DirPusher::new(&migrator).push_dir(&session.dir, &opts)?;
    drop(opts);
    println!(
        "migrated {} file(s) from '{}' to '{bucket}' ({} failed)",
        summary.pushed,
        session.config.bucket(),
        summary.failed
    );
    Ok(())
}
