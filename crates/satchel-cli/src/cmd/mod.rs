pub(crate) mod branch;
pub(crate) mod checkout;
pub(crate) mod clean;
pub(crate) mod config;
pub(crate) mod init;
pub(crate) mod pull;
pub(crate) mod push;
pub(crate) mod revert;

use std::path::PathBuf;
use std::sync::Arc;

use satchel_core::config::Config;
use satchel_core::crypto::aes_gcm::Aes256GcmSealer;
use satchel_core::crypto::iv::IvStore;
use satchel_core::crypto::SealOpener;
use satchel_core::error::{Result, SatchelError};
use satchel_core::remote::{open_remote, Remote};

/// A loaded repository: its config, working directory, and remote.
pub(crate) struct Session {
    pub config: Config,
    pub dir: PathBuf,
    pub remote: Arc<dyn Remote>,
}

/// Load the repository in the current working directory and connect its
/// remote.
pub(crate) fn open_session() -> Result<Session> {
    let dir = std::env::current_dir()?;
    let config = satchel_core::config::load(&dir)?;
    let remote = open_remote(&config.conn_string, config.db.as_deref())?;
    Ok(Session {
        config,
        dir,
        remote,
    })
}

/// Build the AEAD sealer from the configured key file. Encrypted operations
/// refuse to run without one.
pub(crate) fn require_sealer(
    config: &Config,
    ivs: Arc<dyn IvStore>,
) -> Result<Arc<dyn SealOpener>> {
    let Some(key) = config.load_key()? else {
        return Err(SatchelError::PolicyViolation(
            "no key file configured; run `satchel config set key-file <path>`".into(),
        ));
    };
    Ok(Arc::new(Aes256GcmSealer::new(&key, ivs)))
}
