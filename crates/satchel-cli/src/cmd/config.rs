use satchel_core::config;
use satchel_core::error::Result;

use crate::cli::ConfigKey;

/// Run `satchel config set <key> <value>`.
pub(crate) fn set(key: ConfigKey, value: String) -> Result<()> {
    let dir = std::env::current_dir()?;
    let mut cfg = config::load(&dir)?;
    match key {
        ConfigKey::ConnString => cfg.conn_string = value,
        ConfigKey::KeyFile => cfg.key_file = Some(value),
    }
    config::store(&cfg)?;
    Ok(())
}
