use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

pub mod appointments;
pub mod handouts;
pub mod medicines;
pub mod models;
pub mod notifications;
pub mod users;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to parse database URL: {0}")]
    UrlParse(String),
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Failed to migrate database: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Opens (creating if needed) the SQLite database and applies pending migrations.
pub async fn init_db(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DatabaseError::UrlParse(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    log::info!("Database ready at {}", database_url);
    Ok(pool)
}

/// Applies the embedded migrations in `migrations/`. Already-applied ones are skipped.
pub async fn migrate(pool: &SqlitePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Current timestamp as stored in `created_at` / `updated_at` columns.
pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    // a single connection keeps every query on the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("open in-memory database");
    migrate(&pool).await.expect("migrate");
    pool
}

/// A throwaway database file opened through [`init_db`], so tests get the
/// same multi-connection pool the server runs with.
#[cfg(test)]
pub(crate) struct FileDb {
    pub pool: SqlitePool,
    path: std::path::PathBuf,
}

#[cfg(test)]
impl FileDb {
    pub async fn open() -> Self {
        let path = std::env::temp_dir().join(format!("clinicdesk-{}.db", uuid::Uuid::new_v4()));
        let pool = init_db(&format!("sqlite://{}", path.display()))
            .await
            .expect("open file database");
        Self { pool, path }
    }

    pub async fn close(self) {
        self.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
