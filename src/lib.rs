use std::time::Duration;

use envconfig::Envconfig;
use sqlx::SqlitePool;

use crate::auth::password::PasswordHasher;
use crate::auth::session::SessionStore;

pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod router;
pub mod services;
pub mod utils;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL", default = "sqlite://clinicdesk.db")]
    pub database_url: String,

    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: String,

    #[envconfig(from = "SESSION_TTL_MINUTES", default = "120")]
    pub session_ttl_minutes: u64,

    #[envconfig(from = "PASSWORD_ITERATIONS", default = "100000")]
    pub password_iterations: u32,

    #[envconfig(from = "LOW_STOCK_THRESHOLD", default = "5")]
    pub low_stock_threshold: i64,
}

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: SessionStore,
    pub passwords: PasswordHasher,
    pub low_stock_threshold: i64,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            sessions: SessionStore::new(Duration::from_secs(config.session_ttl_minutes * 60)),
            passwords: PasswordHasher::new(config.password_iterations),
            low_stock_threshold: config.low_stock_threshold,
        }
    }
}
