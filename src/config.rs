//! Configuration management for IdeaVault
//!
//! Values come from an optional `config.toml`, then environment variables
//! (a `.env` file is loaded by the binaries), then command-line flags.

use crate::content_store::{Credentials, PinataConfig, RetryPolicy};
use crate::error::{Result, VaultError};
use crate::ledger::AlgodConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub content_store: ContentStoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Origin allowed by CORS; any origin when unset
    #[serde(default)]
    pub frontend_url: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            frontend_url: None,
            log_level: default_log_level(),
            dev_mode: false,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_node_url")]
    pub node_url: String,
    #[serde(default)]
    pub node_token: Option<String>,
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,
    #[serde(default)]
    pub app_id: u64,
    #[serde(default)]
    pub service_mnemonic: Option<String>,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
    #[serde(default = "default_confirmation_rounds")]
    pub confirmation_rounds: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            node_token: None,
            indexer_url: default_indexer_url(),
            app_id: 0,
            service_mnemonic: None,
            network: default_network(),
            explorer_url: default_explorer_url(),
            confirmation_rounds: default_confirmation_rounds(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn to_algod_config(&self) -> AlgodConfig {
        AlgodConfig {
            node_url: self.node_url.clone(),
            node_token: self.node_token.clone(),
            indexer_url: self.indexer_url.clone(),
            app_id: self.app_id,
            service_mnemonic: self.service_mnemonic.clone(),
            confirmation_rounds: self.confirmation_rounds,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentStoreConfig {
    #[serde(default = "default_pinata_api_url")]
    pub api_url: String,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret_api_key: Option<String>,
    #[serde(default = "default_upload_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            api_url: default_pinata_api_url(),
            gateway_url: default_gateway_url(),
            jwt: None,
            api_key: None,
            secret_api_key: None,
            request_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl ContentStoreConfig {
    pub fn to_pinata_config(&self) -> PinataConfig {
        PinataConfig {
            api_url: self.api_url.clone(),
            gateway_url: self.gateway_url.clone(),
            credentials: Credentials::resolve(
                self.jwt.as_deref(),
                self.api_key.as_deref(),
                self.secret_api_key.as_deref(),
            ),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_secs: default_token_expiry_secs(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_database_path() -> String {
    "./data/ideavault.db".to_string()
}

fn default_node_url() -> String {
    "https://testnet-api.algonode.cloud".to_string()
}

fn default_indexer_url() -> String {
    "https://testnet-idx.algonode.cloud".to_string()
}

fn default_network() -> String {
    "testnet".to_string()
}

fn default_explorer_url() -> String {
    "https://testnet.algoexplorer.io".to_string()
}

fn default_confirmation_rounds() -> u64 {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_pinata_api_url() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_gateway_url() -> String {
    "https://gateway.pinata.cloud".to_string()
}

fn default_upload_timeout_secs() -> u64 {
    60
}

fn default_token_expiry_secs() -> u64 {
    crate::auth::DEFAULT_TOKEN_EXPIRY_SECS
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| VaultError::ConfigError(format!("{} has an invalid value: {}", key, raw)))
}

impl Config {
    /// Overlays environment variables. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            let port: u16 = parse_env("PORT", &port)?;
            self.server.listen = format!("0.0.0.0:{}", port);
        }
        if let Some(listen) = get("IDEAVAULT_LISTEN") {
            self.server.listen = listen;
        }
        if let Some(url) = get("FRONTEND_URL") {
            self.server.frontend_url = Some(url);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(dev) = get("DEV_MODE") {
            self.server.dev_mode = parse_env("DEV_MODE", &dev)?;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = path;
        }

        if let Some(url) = get("ALGORAND_NODE_URL") {
            self.ledger.node_url = url;
        }
        if let Some(token) = get("ALGORAND_NODE_TOKEN") {
            self.ledger.node_token = Some(token);
        }
        if let Some(url) = get("ALGORAND_INDEXER_URL") {
            self.ledger.indexer_url = url;
        }
        if let Some(app_id) = get("ALGORAND_APP_ID") {
            self.ledger.app_id = parse_env("ALGORAND_APP_ID", &app_id)?;
        }
        if let Some(mnemonic) = get("ALGORAND_DEPLOYER_MNEMONIC") {
            self.ledger.service_mnemonic = Some(mnemonic);
        }
        if let Some(network) = get("ALGORAND_NETWORK") {
            self.ledger.network = network;
        }
        if let Some(url) = get("ALGORAND_EXPLORER_URL") {
            self.ledger.explorer_url = url;
        }

        if let Some(url) = get("PINATA_API_URL") {
            self.content_store.api_url = url;
        }
        if let Some(url) = get("PINATA_GATEWAY") {
            self.content_store.gateway_url = url;
        }
        if let Some(jwt) = get("PINATA_JWT") {
            self.content_store.jwt = Some(jwt);
        }
        if let Some(key) = get("PINATA_API_KEY") {
            self.content_store.api_key = Some(key);
        }
        if let Some(secret) = get("PINATA_SECRET_API_KEY") {
            self.content_store.secret_api_key = Some(secret);
        }

        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(expiry) = get("JWT_EXPIRY_SECONDS") {
            self.auth.token_expiry_secs = parse_env("JWT_EXPIRY_SECONDS", &expiry)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(VaultError::ConfigError("database.path must be set".to_string()));
        }
        if !self.server.dev_mode && self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(VaultError::ConfigError(format!(
                "JWT_SECRET must be at least {} characters (or set DEV_MODE=true)",
                MIN_JWT_SECRET_LEN
            )));
        }
        Ok(())
    }
}

/// Parses a config file, falling back to defaults when it does not exist.
pub fn load_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(path)?;
    toml::from_str(&config_str)
        .map_err(|e| VaultError::ConfigError(format!("Invalid {}: {}", path.display(), e)))
}

/// File, then process environment. Callers apply their own flags and
/// decide whether to [`Config::validate`].
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config = load_config_file(path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
