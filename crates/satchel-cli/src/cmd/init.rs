use satchel_core::config::{self, Config, DEFAULT_BRANCH};
use satchel_core::error::{Result, SatchelError};

/// Run `satchel init`.
pub(crate) fn run(conn_string: &str, key_file: Option<String>) -> Result<()> {
    let dir = std::env::current_dir()?;
    if config::is_repository(&dir) {
        return Err(SatchelError::Config(format!(
            "'{}' is already a satchel repository",
            dir.display()
        )));
    }

    let cfg = Config {
        conn_string: conn_string.to_string(),
        key_file,
        branches: vec![DEFAULT_BRANCH.to_string()],
        current_branch: Some(DEFAULT_BRANCH.to_string()),
        db: None,
        dir,
    };
    config::store(&cfg)?;
    println!("initialized satchel repository on branch '{DEFAULT_BRANCH}'");
    Ok(())
}
