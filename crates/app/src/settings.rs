//! Handles settings for the application. Configuration is read from
//! `settings.toml` and `RULEBOOK_` prefixed environment variables
//! (`RULEBOOK_SERVER__PORT=8080`).
//!
//! See `settings.toml` for the configuration.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Self::Sqlite("./rulebook.db".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
}

/// Shared by the server and the sweep.
#[derive(Debug, Default, Deserialize)]
pub struct Engine {
    #[serde(default)]
    pub database: Database,
    /// Rows per enrichment provider request.
    pub ai_batch_size: Option<usize>,
}

/// Periodic run of every active rule.
#[derive(Debug, Deserialize)]
pub struct Sweep {
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Option<Server>,
    #[serde(default)]
    pub engine: Engine,
    pub sweep: Option<Sweep>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("RULEBOOK").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
