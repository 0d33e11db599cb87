use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::dialect::{Dialect, PlaceholderStyle};
use crate::storage::ConnectionSettings;

pub const CONFIG_FILE: &str = "pgprovider.toml";

/// Global settings for pgprovider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Provider name or alias, see `get_default_provider_registry`
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
        }
    }
}

fn default_provider() -> String {
    "postgres".to_string()
}

/// Database connection and pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection string; `DATABASE_URL` is used by the CLI when absent
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
    #[serde(default)]
    pub command_timeout_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            pool_size: default_pool_size(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
            command_timeout_ms: None,
        }
    }
}

fn default_pool_size() -> usize {
    10
}

fn default_checkout_timeout_ms() -> u64 {
    15_000
}

/// Batching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound of operations grouped into one statement
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_true")]
    pub retry_connection_lost: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            retry_connection_lost: true,
        }
    }
}

fn default_max_batch_size() -> usize {
    crate::provider::services::DEFAULT_MAX_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

/// Partial dialect; set fields replace the provider's defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialectOverride {
    pub quote_char: Option<char>,
    pub placeholder: Option<PlaceholderStyle>,
    pub multi_row: Option<bool>,
    pub max_identifier_length: Option<usize>,
    pub max_parameters: Option<usize>,
}

impl DialectOverride {
    pub fn apply(&self, mut dialect: Dialect) -> Dialect {
        if let Some(q) = self.quote_char {
            dialect.quote_char = q;
        }
        if let Some(p) = self.placeholder {
            dialect.placeholder = p;
        }
        if let Some(m) = self.multi_row {
            dialect.multi_row = m;
        }
        if let Some(n) = self.max_identifier_length {
            dialect.max_identifier_length = n;
        }
        if let Some(n) = self.max_parameters {
            dialect.max_parameters = n;
        }
        dialect
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub dialect: Option<DialectOverride>,
}

impl Config {
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            checkout_timeout: Duration::from_millis(self.connection.checkout_timeout_ms),
            command_timeout: self.connection.command_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Load configuration from pgprovider.toml file
pub fn load_config() -> Result<Option<Config>> {
    load_config_from_path(Path::new(CONFIG_FILE))
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from_path(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();
        let cfg = load_config_from_path(file.path()).unwrap().unwrap();
        assert_eq!(cfg.settings.provider, "postgres");
        assert_eq!(cfg.connection.pool_size, 10);
        assert_eq!(cfg.batch.max_batch_size, 1000);
        assert!(cfg.batch.retry_connection_lost);
        assert!(cfg.dialect.is_none());
        assert_eq!(cfg.connection_settings(), ConnectionSettings::default());
    }

    #[test]
    fn full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[settings]
provider = "pg"

[connection]
dsn = "postgres://app@localhost/app"
pool_size = 4
checkout_timeout_ms = 250
command_timeout_ms = 5000

[batch]
max_batch_size = 50

[dialect]
placeholder = "named"
multi_row = false
"#
        )
        .unwrap();
        let cfg = load_config_from_path(file.path()).unwrap().unwrap();
        assert_eq!(cfg.settings.provider, "pg");
        assert_eq!(cfg.connection.dsn.as_deref(), Some("postgres://app@localhost/app"));
        assert_eq!(cfg.connection.pool_size, 4);
        assert_eq!(cfg.batch.max_batch_size, 50);

        let settings = cfg.connection_settings();
        assert_eq!(settings.checkout_timeout, Duration::from_millis(250));
        assert_eq!(settings.command_timeout, Some(Duration::from_secs(5)));

        let dialect = cfg.dialect.unwrap().apply(Dialect::postgres());
        assert_eq!(dialect.placeholder, PlaceholderStyle::Named);
        assert!(!dialect.multi_row);
        assert_eq!(dialect.max_identifier_length, 63);
    }

    #[test]
    fn malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[connection]\npool_size = \"many\"\n").unwrap();
        let err = load_config_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing"));
    }
}
