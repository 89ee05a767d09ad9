use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::Connection;

use crate::api::error::ApiError;
use crate::auth;
use crate::calc::GradeScale;
use crate::config::{AppConfig, RatePolicyConfig};
use crate::db;
use crate::ratelimit::{Clock, KeyStrategy, RateLimiter, RatePolicy, SystemClock};

pub type SharedState = Arc<AppState>;

pub struct Limiters {
    pub general: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub upload: Arc<RateLimiter>,
    pub search: Arc<RateLimiter>,
    pub admin: Arc<RateLimiter>,
}

impl Limiters {
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let limits = &config.rate_limits;
        let make = |name: &'static str,
                    policy: RatePolicyConfig,
                    strategy: KeyStrategy,
                    message: &'static str| {
            Arc::new(
                RateLimiter::with_clock(
                    RatePolicy::from_config(name, policy, strategy, message),
                    clock.clone(),
                )
                .with_trusted_proxies(config.server.trusted_proxies.clone()),
            )
        };
        Self {
            general: make(
                "general",
                limits.general,
                KeyStrategy::PerIp,
                "Too many requests, please try again later",
            ),
            auth: make(
                "auth",
                limits.auth,
                KeyStrategy::PerIp,
                "Too many authentication attempts, please try again later",
            ),
            upload: make(
                "upload",
                limits.upload,
                KeyStrategy::PerIp,
                "Too many uploads, please try again later",
            ),
            search: make(
                "search",
                limits.search,
                KeyStrategy::PerIp,
                "Too many search requests, please slow down",
            ),
            admin: make(
                "admin",
                limits.admin,
                KeyStrategy::PerUser,
                "Too many admin operations, please try again later",
            ),
        }
    }

    pub fn all(&self) -> [&Arc<RateLimiter>; 5] {
        [
            &self.general,
            &self.auth,
            &self.upload,
            &self.search,
            &self.admin,
        ]
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub grading: GradeScale,
    pub limiters: Limiters,
    db: Mutex<Connection>,
}

impl AppState {
    pub fn open(config: AppConfig) -> anyhow::Result<SharedState> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: AppConfig,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<SharedState> {
        let grading = config.grading.scale()?;
        let conn = db::open_db(&config.server.data_dir).with_context(|| {
            format!(
                "failed to open database in {}",
                config.server.data_dir.to_string_lossy()
            )
        })?;
        auth::ensure_bootstrap_admin(&conn, &config.auth)?;
        let limiters = Limiters::from_config(&config, clock);

        Ok(Arc::new(Self {
            config,
            grading,
            limiters,
            db: Mutex::new(conn),
        }))
    }

    /// The shared connection. Never hold the guard across an `.await`.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("database lock poisoned")))
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.server.data_dir
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }
}
