use satchel_core::config;
use satchel_core::error::{Result, SatchelError};

/// Run `satchel branch [name]`: list branches, or create one.
pub(crate) fn run(name: Option<String>) -> Result<()> {
    let dir = std::env::current_dir()?;
    let mut cfg = config::load(&dir)?;

    let Some(name) = name else {
        let current = cfg.bucket().to_string();
        for branch in &cfg.branches {
            let marker = if *branch == current { "*" } else { " " };
            println!("{marker} {branch}");
        }
        return Ok(());
    };

    if cfg.branches.iter().any(|b| *b == name) {
        return Err(SatchelError::Config(format!(
            "branch '{name}' already exists"
        )));
    }
    cfg.branches.push(name.clone());
    config::store(&cfg)?;
    println!("created branch '{name}'");
    Ok(())
}
