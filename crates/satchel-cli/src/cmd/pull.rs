use std::sync::Arc;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use satchel_core::error::Result;
use satchel_core::remote::Remote;
use satchel_core::store::{PullOptions, Store};
use satchel_core::workdir;

use super::{open_session, require_sealer};
use crate::progress;

pub(crate) struct PullFlags {
    pub filter: Option<String>,
    pub sample: usize,
    pub workers: usize,
    pub mask: bool,
    pub describe: bool,
    pub describe_files: bool,
}

/// Run `satchel pull`.
pub(crate) fn run(flags: PullFlags) -> Result<()> {
    let session = open_session()?;
    let sealer = require_sealer(&session.config, session.remote.initvectors())?;
    let store = Store::open(Arc::clone(&session.remote), session.config.bucket())?;

    let (progress_tx, renderer) = progress::spawn_renderer();
    let opts = PullOptions {
        filter: flags.filter.unwrap_or_default(),
        sample_size: flags.sample,
        workers: flags.workers,
        mask_name: flags.mask,
        describe_only: flags.describe,
        describe_files_only: flags.describe_files,
        sealer: Some(sealer),
        progress: Some(progress_tx),
        ..Default::default()
    };

    let summary = workdir::pull_into(&session.dir, &store, &opts);
    drop(opts);
    renderer.join().ok();
    let summary = summary?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(["File Count", "Size (MB)"]);
    table.add_row([
        summary.description.count.to_string(),
        format_mb(summary.description.size),
    ]);
    println!("{table}");

    if flags.describe_files {
        let mut files = Table::new();
        files.load_preset(UTF8_FULL_CONDENSED);
        files.set_header(["Name", "Size (MB)"]);
        for file in &summary.description.file_descriptions {
            files.add_row([file.name.clone(), format_mb(file.size)]);
        }
        println!("{files}");
    }

    if !flags.describe && !flags.describe_files {
        println!("wrote {} file(s)", summary.written);
    }
    Ok(())
}

fn format_mb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / 1e6)
}
