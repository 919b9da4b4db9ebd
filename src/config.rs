// config.rs
use serde::Deserialize;

use crate::error::Result;
use crate::middleware::RequestLogOptions;

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "reqlog=debug,info"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Request logging middleware settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RequestLogConfig {
    pub header_name: String,
    pub blacklist: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for RequestLogConfig {
    fn default() -> Self {
        let defaults = RequestLogOptions::default();
        Self {
            header_name: defaults.header_name,
            blacklist: defaults.blacklist,
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

impl From<&RequestLogConfig> for RequestLogOptions {
    fn from(cfg: &RequestLogConfig) -> Self {
        RequestLogOptions::default()
            .header_name(cfg.header_name.clone())
            .blacklist(cfg.blacklist.iter().cloned())
            .max_body_bytes(cfg.max_body_bytes)
    }
}

/// Global configuration
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub request_log: RequestLogConfig,
}

impl Config {
    /// Load config from `config/default` (or `path`) and `APP__*` environment variables.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(path.unwrap_or("config/default")).required(path.is_some()),
            )
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("request_log.blacklist")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        Ok(cfg)
    }
}
