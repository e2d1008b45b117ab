use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encryption::{PasswordMaterial, DEFAULT_PASSWORD, DEFAULT_SALT};
use crate::issuer::CaPasswordDefaults;

pub const CONFIG_PATH_ENV: &str = "CA_CONSOLE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub secrets: Secrets,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub defaults: CaDefaults,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Inputs of the record encryption key derivation.
#[derive(Debug, Deserialize, Clone)]
pub struct Secrets {
    #[serde(default = "default_password", deserialize_with = "secret")]
    pub password: SecretString,
    #[serde(default = "default_salt", deserialize_with = "secret")]
    pub salt: SecretString,
}

impl Default for Secrets {
    fn default() -> Self {
        Self {
            password: default_password(),
            salt: default_salt(),
        }
    }
}

fn default_password() -> SecretString {
    SecretString::from(DEFAULT_PASSWORD.to_string())
}

fn default_salt() -> SecretString {
    SecretString::from(DEFAULT_SALT.to_string())
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    #[serde(default = "default_command_bin")]
    pub command_bin: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command_bin: default_command_bin(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_command_bin() -> String {
    "step".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Fallback CA passwords used when a request leaves them empty.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CaDefaults {
    #[serde(default, deserialize_with = "optional_secret")]
    pub root_ca_password: Option<SecretString>,
    #[serde(default, deserialize_with = "optional_secret")]
    pub intermediate_ca_password: Option<SecretString>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/ca-console.redb")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,
    #[serde(default = "default_recovery_file")]
    pub recovery_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tls_cert_path: None,
            tls_key_path: None,
            recovery_file: default_recovery_file(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_recovery_file() -> PathBuf {
    PathBuf::from("cert.json")
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .context(format!("Invalid listen address: {}", self.listen))
    }

    /// Certificate and key paths, when both are configured.
    pub fn tls(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<SecretString, D::Error> {
    String::deserialize(deserializer).map(SecretString::from)
}

fn optional_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config file")
    }

    /// Load the file named by `CA_CONSOLE_CONFIG` (default `config.toml`) and
    /// apply environment overrides. A missing default file yields defaults.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok().filter(|p| !p.is_empty());
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_none() && !path.exists() {
            Self::default()
        } else {
            Self::from_file(&path)?
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from `lookup` (normally the process environment).
    /// Unset and empty variables leave the field alone.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("CA_CONSOLE_DATABASE_PASSWORD") {
            self.secrets.password = SecretString::from(v);
        }
        if let Some(v) = var("CA_CONSOLE_DATABASE_SALT") {
            self.secrets.salt = SecretString::from(v);
        }
        if let Some(v) = var("CA_CONSOLE_STEP_BIN") {
            self.tool.command_bin = v;
        }
        if let Some(v) = var("CA_CONSOLE_TOOL_TIMEOUT_SECS") {
            self.tool.timeout_secs = v
                .parse()
                .context(format!("Invalid CA_CONSOLE_TOOL_TIMEOUT_SECS: {}", v))?;
        }
        if let Some(v) = var("CA_CONSOLE_ROOT_CA_PASSWORD") {
            self.defaults.root_ca_password = Some(SecretString::from(v));
        }
        if let Some(v) = var("CA_CONSOLE_INTERMEDIATE_CA_PASSWORD") {
            self.defaults.intermediate_ca_password = Some(SecretString::from(v));
        }
        if let Some(v) = var("CA_CONSOLE_DATABASE_FILENAME") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some(v) = var("CA_CONSOLE_LISTEN") {
            self.server.listen = v;
        }
        Ok(())
    }

    pub fn password_material(&self) -> PasswordMaterial {
        PasswordMaterial::new(self.secrets.salt.clone(), self.secrets.password.clone())
    }

    pub fn ca_password_defaults(&self) -> CaPasswordDefaults {
        CaPasswordDefaults {
            root_ca: self.defaults.root_ca_password.clone(),
            intermediate_ca: self.defaults.intermediate_ca_password.clone(),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool.timeout_secs)
    }
}
