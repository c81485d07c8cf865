//! Server configuration

use std::net::{IpAddr, SocketAddr};

use super::error::ValidationError;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Environment name, from `NODE_ENV`
    pub environment: Environment,

    /// Log filter directive, from `LOG_LEVEL`
    pub log_level: Option<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// CORS allowed origins (comma-separated), used in production
    pub cors_origins: Option<String>,
}

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Parses `NODE_ENV`. Anything unrecognized is development.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("production") => Environment::Production,
            Some("test") => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

impl ServerConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ValidationError::InvalidUrl("HOST"))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get CORS origins as a vector
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .as_ref()
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> String {
        self.log_level
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(default_log_level)
    }

    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        self.socket_addr()?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            log_level: None,
            request_timeout_secs: default_request_timeout(),
            cors_origins: None,
        }
    }
}

pub(super) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(super) fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info,subscription_guardian=debug".to_string()
}

pub(super) fn default_request_timeout() -> u64 {
    30
}
