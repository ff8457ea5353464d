//! Config command handlers.

use anyhow::Result;
use visor_core::config::{Config, paths};

pub fn path() -> Result<()> {
    println!("{}", paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let path = Config::init()?;
    println!("Created config at {}", path.display());
    Ok(())
}

pub fn set_backend(url: &str) -> Result<()> {
    Config::save_backend_url(url)?;
    println!("Backend base URL set to {url}");
    Ok(())
}
