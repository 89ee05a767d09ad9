//! Layered configuration loading using figment.
//!
//! Sources in priority order (highest wins):
//! 1. Environment variables (`ERPD_*` prefix, `__` as separator)
//! 2. The TOML file named by `ERPD_CONFIG`, or `./erpd.toml` if present
//! 3. Built-in defaults
//!
//! Figment maps `ERPD_SERVER__PORT` -> `server.port`,
//! `ERPD_RATE_LIMITS__AUTH__MAX_REQUESTS` -> `rate_limits.auth.max_requests`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

use crate::calc::{self, GradeBand, GradeScale};

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Figment(Box::new(e))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; `*` allows any origin.
    pub cors_origin: String,
    /// Directory holding the database file, uploads and backups.
    pub data_dir: PathBuf,
    pub default_page_size: u32,
    pub max_upload_bytes: usize,
    /// Peers whose `X-Forwarded-For`/`X-Real-IP` headers are believed.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origin: "http://localhost:3000".to_string(),
            data_dir: PathBuf::from("data"),
            default_page_size: 20,
            max_upload_bytes: 5 * 1024 * 1024,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
    pub bootstrap_admin_email: String,
    pub bootstrap_admin_password: String,
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24,
            bootstrap_admin_email: "admin@erp.local".to_string(),
            bootstrap_admin_password: "change-me-now".to_string(),
            allow_registration: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RatePolicyConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl RatePolicyConfig {
    pub const fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub general: RatePolicyConfig,
    pub auth: RatePolicyConfig,
    pub upload: RatePolicyConfig,
    pub search: RatePolicyConfig,
    pub admin: RatePolicyConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            general: RatePolicyConfig::new(15 * 60, 300),
            auth: RatePolicyConfig::new(15 * 60, 10),
            upload: RatePolicyConfig::new(60 * 60, 20),
            search: RatePolicyConfig::new(60, 30),
            admin: RatePolicyConfig::new(15 * 60, 100),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GradingConfig {
    pub ca_max: f64,
    pub exam_max: f64,
    pub pass_mark: f64,
    pub bands: Vec<GradeBand>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            ca_max: calc::DEFAULT_CA_MAX,
            exam_max: calc::DEFAULT_EXAM_MAX,
            pass_mark: calc::DEFAULT_PASS_MARK,
            bands: calc::default_bands(),
        }
    }
}

impl GradingConfig {
    pub fn scale(&self) -> Result<GradeScale, ConfigError> {
        GradeScale::new(
            self.ca_max,
            self.exam_max,
            self.pass_mark,
            self.bands.clone(),
        )
        .map_err(|e| ConfigError::InvalidValue {
            field: "grading".to_string(),
            reason: e.message,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub grading: GradingConfig,
}

impl AppConfig {
    /// Load configuration from the TOML file and environment, then validate.
    ///
    /// Does NOT read `.env`; use [`AppConfig::load_with_dotenv`] for that.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the current directory (if any) before building the figment.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the provider chain. Public so tests can merge extra providers.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let file = std::env::var("ERPD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("erpd.toml"));
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }

        figment.merge(Env::prefixed("ERPD_").ignore(&["config"]).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if !(1..=100).contains(&self.server.default_page_size) {
            return Err(invalid("server.default_page_size", "must be between 1 and 100"));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(invalid("server.max_upload_bytes", "must be positive"));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(invalid("auth.token_ttl_hours", "must be positive"));
        }
        if self.auth.bootstrap_admin_password.len() < 8 {
            return Err(invalid(
                "auth.bootstrap_admin_password",
                "must be at least 8 characters",
            ));
        }

        let limits = &self.rate_limits;
        for (name, policy) in [
            ("general", limits.general),
            ("auth", limits.auth),
            ("upload", limits.upload),
            ("search", limits.search),
            ("admin", limits.admin),
        ] {
            if policy.window_secs == 0 || policy.max_requests == 0 {
                return Err(invalid(
                    &format!("rate_limits.{}", name),
                    "window_secs and max_requests must be positive",
                ));
            }
        }

        self.grading.scale()?;
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
