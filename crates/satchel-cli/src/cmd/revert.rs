use std::sync::Arc;

use satchel_core::error::Result;
use satchel_core::store::{Reverter, Store};

use super::open_session;

/// Run `satchel revert <sha>`. Destructive: deletes every file the sha's
/// commits reference.
pub(crate) fn run(sha: &str) -> Result<()> {
    let session = open_session()?;
    let store = Store::open(Arc::clone(&session.remote), session.config.bucket())?;
    store.revert(sha)?;
    println!("reverted '{sha}'");
    Ok(())
}
