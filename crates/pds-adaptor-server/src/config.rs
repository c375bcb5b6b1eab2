use pds_adaptor_client::retry::DEFAULT_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, net::SocketAddr, time::Duration};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Upstream PDS FHIR and token endpoint settings
    #[serde(default)]
    pub pds: PdsConfig,
    /// Inbound caller authentication
    #[serde(default)]
    pub auth: AuthSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // PDS validations
        self.pds.access_token_url()?;
        self.pds.fhir_url()?;
        if self.pds.jwt_api_key.trim().is_empty() {
            return Err("pds.jwt_api_key must not be empty".into());
        }
        if self.pds.jwt_key_id.trim().is_empty() {
            return Err("pds.jwt_key_id must not be empty".into());
        }
        if self.pds.max_update_retries == 0 {
            return Err("pds.max_update_retries must be > 0".into());
        }
        if self.pds.request_timeout_ms == 0 {
            return Err("pds.request_timeout_ms must be > 0".into());
        }
        // Auth validation
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            return Err("auth.enabled=true requires at least one entry in auth.api_keys".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// PDS FHIR connection settings.
///
/// `jwt_private_key` is only parsed when the first assertion is signed, so a
/// bad key is reported per request rather than at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct PdsConfig {
    #[serde(default)]
    pub access_token_endpoint: String,
    #[serde(default)]
    pub fhir_endpoint: String,
    /// PEM encoded RSA key (PKCS#1 or PKCS#8). Literal `\n` sequences are accepted.
    #[serde(default)]
    pub jwt_private_key: String,
    #[serde(default)]
    pub jwt_api_key: String,
    #[serde(default)]
    pub jwt_key_id: String,
    /// Attempts per logical operation, including the first.
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Re-read the record instead of failing when a patch changes nothing.
    #[serde(default)]
    pub treat_no_op_patch_as_success: bool,
}

fn default_max_update_retries() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for PdsConfig {
    fn default() -> Self {
        Self {
            access_token_endpoint: String::new(),
            fhir_endpoint: String::new(),
            jwt_private_key: String::new(),
            jwt_api_key: String::new(),
            jwt_key_id: String::new(),
            max_update_retries: default_max_update_retries(),
            request_timeout_ms: default_request_timeout_ms(),
            treat_no_op_patch_as_success: false,
        }
    }
}

impl fmt::Debug for PdsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdsConfig")
            .field("access_token_endpoint", &self.access_token_endpoint)
            .field("fhir_endpoint", &self.fhir_endpoint)
            .field("jwt_private_key", &"[redacted]")
            .field("jwt_api_key", &self.jwt_api_key)
            .field("jwt_key_id", &self.jwt_key_id)
            .field("max_update_retries", &self.max_update_retries)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("treat_no_op_patch_as_success", &self.treat_no_op_patch_as_success)
            .finish()
    }
}

impl PdsConfig {
    pub fn access_token_url(&self) -> Result<Url, String> {
        parse_endpoint("pds.access_token_endpoint", &self.access_token_endpoint)
    }

    pub fn fhir_url(&self) -> Result<Url, String> {
        parse_endpoint("pds.fhir_endpoint", &self.fhir_endpoint)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_endpoint(field: &str, value: &str) -> Result<Url, String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    let url = Url::parse(value).map_err(|e| format!("{field} is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(format!("{field} must be an http(s) URL"));
    }
    Ok(url)
}

/// Inbound Basic Auth settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
    /// Caller name to API key.
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

fn default_auth_enabled() -> bool {
    true
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            api_keys: HashMap::new(),
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut callers: Vec<&String> = self.api_keys.keys().collect();
        callers.sort();
        f.debug_struct("AuthSettings")
            .field("enabled", &self.enabled)
            .field("callers", &callers)
            .finish()
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "pds-adaptor.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., PDS_ADAPTOR__PDS__MAX_UPDATE_RETRIES=5
        builder = builder.add_source(
            Environment::with_prefix("PDS_ADAPTOR")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
