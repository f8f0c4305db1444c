use satchel_core::config;
use satchel_core::error::{Result, SatchelError};
use satchel_core::workdir;

/// Run `satchel clean`: securely remove the working directory's plaintext.
pub(crate) fn run() -> Result<()> {
    let dir = std::env::current_dir()?;
    if !config::is_repository(&dir) {
        return Err(SatchelError::ConfigAbsent(dir.display().to_string()));
    }
    let removed = workdir::clean(&dir)?;
    println!("securely removed {removed} file(s)");
    Ok(())
}
