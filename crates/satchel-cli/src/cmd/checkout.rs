use satchel_core::config;
use satchel_core::error::{Result, SatchelError};

/// Run `satchel checkout [-b] <name>`.
pub(crate) fn run(name: &str, create: bool) -> Result<()> {
    let dir = std::env::current_dir()?;
    let mut cfg = config::load(&dir)?;

    if !cfg.branches.iter().any(|b| b == name) {
        if !create {
            return Err(SatchelError::Config(format!(
                "branch '{name}' does not exist (use -b to create it)"
            )));
        }
        cfg.branches.push(name.to_string());
    }

    cfg.current_branch = Some(name.to_string());
    config::store(&cfg)?;
    println!("switched to branch '{name}'");
    Ok(())
}
