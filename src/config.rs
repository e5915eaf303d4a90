// Settings file loader
//
// Flat key-value TOML file holding the database connection parameters and the
// output directory for generated images. Written with defaults on first run.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{CodeManagerError, Result};

/// Database driver selected by the `driver` key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Mysql,
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Mysql => "mysql",
            Driver::Sqlite => "sqlite",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Driver::Mysql),
            "sqlite" => Ok(Driver::Sqlite),
            other => Err(CodeManagerError::Config(format!("Unknown driver: {}", other))),
        }
    }
}

/// Connection parameters and storage location.
/// For the sqlite driver, `database` is the database file path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Configuration {
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub output_dir: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            driver: Driver::parse(DEFAULT_DRIVER).unwrap_or(Driver::Mysql),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

/// Keys accepted by `Configuration::set`, in file order.
pub const CONFIG_KEYS: [&str; 7] = ["driver", "host", "port", "user", "password", "database", "output_dir"];

impl Configuration {
    /// Configuration for a SQLite database file.
    pub fn sqlite(database: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            driver: Driver::Sqlite,
            database: database.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Update one field by key name.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "driver" => self.driver = Driver::parse(value)?,
            "host" => self.host = value.to_string(),
            "port" => {
                self.port = value
                    .trim()
                    .parse()
                    .map_err(|_| CodeManagerError::Config(format!("Invalid port: {}", value)))?
            }
            "user" => self.user = value.to_string(),
            "password" => self.password = value.to_string(),
            "database" => self.database = value.to_string(),
            "output_dir" => self.output_dir = PathBuf::from(value),
            other => {
                return Err(CodeManagerError::Config(format!(
                    "Unknown setting '{}' (expected one of: {})",
                    other,
                    CONFIG_KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// Field value by key name. The password is masked.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "driver" => self.driver.as_str().to_string(),
            "host" => self.host.clone(),
            "port" => self.port.to_string(),
            "user" => self.user.clone(),
            "password" => "*".repeat(self.password.len()),
            "database" => self.database.clone(),
            "output_dir" => self.output_dir.display().to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// Default settings location: <platform config dir>/code-manager/config.toml
pub fn default_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", APP_DIR_NAME)
        .ok_or_else(|| CodeManagerError::Config("Could not determine config directory".to_string()))?;
    Ok(dirs.config_dir().join(CONFIG_FILENAME))
}

/// Load settings, writing the defaults first if the file does not exist.
pub fn load(path: &Path) -> Result<Configuration> {
    if !path.exists() {
        let config = Configuration::default();
        save(path, &config)?;
        log::info!("Created default settings at {}", path.display());
        return Ok(config);
    }

    let text = std::fs::read_to_string(path)?;
    let config: Configuration = toml::from_str(&text)?;
    Ok(config)
}

/// Overwrite the settings file.
pub fn save(path: &Path, config: &Configuration) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let text = toml::to_string(config)?;
    std::fs::write(path, text)?;
    Ok(())
}
