//! Configuration commands.

use super::CliEnv;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use beacon_core::Config;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Configuration with the API key masked.
#[derive(Debug, Serialize)]
struct ConfigView {
    path: PathBuf,
    #[serde(flatten)]
    config: Config,
}

impl ConfigView {
    fn new(path: PathBuf, mut config: Config) -> Self {
        config.api_key = output::mask(&config.api_key);
        Self { path, config }
    }
}

impl fmt::Display for ConfigView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        writeln!(f, "{}", output::row("File", self.path.display()))?;
        writeln!(f, "{}", output::row("API host", &c.api_host))?;
        writeln!(f, "{}", output::row("API key", &c.api_key))?;
        writeln!(f, "{}", output::row("Flush interval", format!("{} ms", c.flush_interval_ms)))?;
        writeln!(f, "{}", output::row("Flush size", c.flush_size))?;
        writeln!(f, "{}", output::row("Max queue size", c.max_queue_size))?;
        writeln!(f, "{}", output::row("Send timeout", format!("{} ms", c.send_timeout_ms)))?;
        writeln!(
            f,
            "{}",
            output::row("Backoff", format!("{}..{} ms", c.backoff_base_ms, c.backoff_max_ms))
        )?;
        writeln!(f, "{}", output::row("Compression", c.compression))?;
        writeln!(f, "{}", output::row("Storage key", &c.storage_key))?;
        write!(f, "{}", output::row("Log level", &c.log_level))
    }
}

/// Print the effective configuration.
pub fn config_show(env: &CliEnv, format: &OutputFormat) -> Result<()> {
    output::print(&ConfigView::new(env.paths.config_file(), env.config.clone()), format);
    Ok(())
}

/// Write `config.json`, starting from defaults.
pub fn config_init(
    env: &CliEnv,
    api_key: Option<String>,
    host: Option<String>,
    force: bool,
    format: &OutputFormat,
) -> Result<()> {
    let path = env.paths.config_file();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = Config::default();
    if let Some(api_key) = api_key {
        config.api_key = api_key;
    }
    if let Some(host) = host {
        config.api_host = host;
    }
    config.api_url()?;
    config.save(&env.paths)?;

    output::print(&ConfigView::new(path, config), format);
    Ok(())
}
