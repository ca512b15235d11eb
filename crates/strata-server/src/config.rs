//! Server configuration
//!
//! Loaded from an optional `strata.toml` plus `STRATA__`-prefixed
//! environment variables (e.g. `STRATA__DATABASE__URL`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// HTTP port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Data-source URL. A `{tenant}` placeholder is substituted per
    /// tenant; empty means file-backed SQLite under `data_dir`.
    #[serde(default)]
    pub url: String,

    /// Directory for file-backed tenant databases
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HS256 secret for verifying principal tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_jwt_secret() -> String {
    "development-secret".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            http_port: default_http_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
        }
    }
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("strata").required(false))
            .add_source(config::Environment::with_prefix("STRATA").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// The database URL for one tenant
    pub fn tenant_url(&self, tenant: &str) -> String {
        if self.database.url.is_empty() {
            format!("sqlite:{}/{tenant}.db", self.database.data_dir)
        } else {
            self.database.url.replace("{tenant}", tenant)
        }
    }
}
