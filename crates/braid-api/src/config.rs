use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub mongodb: MongoDbConfig,
    pub upstream: UpstreamConfig,
    pub relay: RelayConfig,
    pub quota: QuotaConfig,
    pub account: AccountConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: String,
    #[serde(default)]
    pub openrouter_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Attribution headers the completion provider expects
    pub referer: String,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Minimum spacing between streaming content writes for one message
    pub debounce_ms: u64,
    /// How long the relay waits on a silent upstream before marking the
    /// message failed
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Assistant messages per rolling month without a subscription
    pub free_limit: u64,
    /// Assistant messages per rolling month with an active subscription
    pub pro_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Base URL of the account service that owns sessions and billing
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (BRAID__ prefix, e.g. BRAID__SERVER__PORT)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("BRAID")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;

        let mut cfg: Config = config.try_deserialize()?;

        // Secrets come from ENV, never from TOML
        cfg.mongodb_uri = std::env::var("MONGODB_URI").map_err(|_| {
            ConfigError::Message("MONGODB_URI environment variable is required".to_string())
        })?;
        cfg.openrouter_api_key = std::env::var("OPENROUTER_API_KEY").map_err(|_| {
            ConfigError::Message("OPENROUTER_API_KEY environment variable is required".to_string())
        })?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_structure() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [cors]
            enabled = true
            origins = ["http://localhost:5173"]

            [mongodb]
            database = "braid_test"

            [upstream]
            base_url = "https://openrouter.ai/api/v1"
            referer = "https://chat.example.com"
            title = "Test Chat"

            [relay]
            debounce_ms = 250
            idle_timeout_secs = 120

            [quota]
            free_limit = 10
            pro_limit = 1500

            [account]
            base_url = "http://127.0.0.1:4000"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.relay.debounce_ms, 250);
        assert_eq!(config.quota.free_limit, 10);
        assert_eq!(config.quota.pro_limit, 1500);
    }
}
