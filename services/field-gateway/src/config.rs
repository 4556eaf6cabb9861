//! Configuration types and loading
//!
//! Settings come from the TOML file, with serde defaults for omitted keys.
//! The file path is `--config`, then CONFIG_PATH, then the default name.
//! The client secret is loaded from DATAVERSE_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use dataverse_auth::DEFAULT_AUTHORITY_HOST;
use dataverse_client::DEFAULT_MAX_PAGES;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const CLIENT_SECRET_ENV: &str = "DATAVERSE_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub dataverse: DataverseConfig,
    pub gateway: GatewayConfig,
}

/// Dataverse environment and app registration
#[derive(Debug, Deserialize)]
pub struct DataverseConfig {
    /// Environment root, e.g. `https://contoso.crm.dynamics.com`
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub tenant_id: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Secret<String>,
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

/// Inbound HTTP settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// PATCH and photo upload are refused unless set.
    #[serde(default)]
    pub allow_writes: bool,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// `*` or a single origin. No CORS headers when unset.
    #[serde(default)]
    pub cors_allow_origin: Option<String>,
}

fn default_api_version() -> String {
    "v9.2".into()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.into()
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn require_http_url(key: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{key} must start with http:// or https://, got: {value}"
        )))
    }
}

fn require_non_empty(key: &str, value: &str) -> common::Result<()> {
    if value.trim().is_empty() {
        Err(common::Error::Config(format!("{key} must not be empty")))
    } else {
        Ok(())
    }
}

fn require_non_zero(key: &str, value: usize) -> common::Result<()> {
    if value == 0 {
        Err(common::Error::Config(format!("{key} must be greater than 0")))
    } else {
        Ok(())
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. DATAVERSE_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        let dv = &mut config.dataverse;
        require_http_url("base_url", &dv.base_url)?;
        require_http_url("authority_host", &dv.authority_host)?;
        require_non_empty("tenant_id", &dv.tenant_id)?;
        require_non_empty("client_id", &dv.client_id)?;
        require_non_empty("api_version", &dv.api_version)?;
        require_non_zero("max_pages", dv.max_pages)?;
        dv.base_url = dv.base_url.trim_end_matches('/').to_string();

        let gw = &config.gateway;
        require_non_zero("max_connections", gw.max_connections)?;
        require_non_zero("max_upload_bytes", gw.max_upload_bytes)?;
        if let Some(origin) = &gw.cors_allow_origin {
            require_non_empty("cors_allow_origin", origin)?;
        }

        config.dataverse.client_secret = Self::resolve_secret(&config.dataverse)?;
        Ok(config)
    }

    fn resolve_secret(dv: &DataverseConfig) -> common::Result<Secret<String>> {
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            let secret = secret.trim();
            if !secret.is_empty() {
                return Ok(Secret::new(secret.to_owned()));
            }
        }

        let Some(secret_file) = &dv.client_secret_file else {
            return Err(common::Error::MissingSecret(format!(
                "set {CLIENT_SECRET_ENV} or client_secret_file"
            )));
        };
        let secret = std::fs::read_to_string(secret_file).map_err(|e| {
            common::Error::Config(format!(
                "failed to read client_secret_file {}: {e}",
                secret_file.display()
            ))
        })?;
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(common::Error::MissingSecret(format!(
                "client_secret_file {} is empty",
                secret_file.display()
            )));
        }
        Ok(Secret::new(secret.to_owned()))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("dataverse-field-gateway.toml")
    }
}
