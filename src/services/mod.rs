use sqlx::SqlitePool;

use crate::db::notifications::{self, NewNotification};

pub mod stock;

/// Writes an entry to the audit/notification log.
///
/// The log is best-effort: a failed insert is reported and swallowed so the
/// action that triggered it still completes.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `entry` - The row to write; `action` selects which feeds and counters see it
pub async fn record(pool: &SqlitePool, entry: NewNotification) {
    let action = entry.action.map(|a| a.as_str()).unwrap_or("notice");
    match notifications::insert(pool, &entry).await {
        Ok(row) => log::debug!("Recorded {} log entry {}", action, row.id),
        Err(e) => log::warn!("Failed to record {} log entry: {}", action, e),
    }
}

/// Human name for the acting user in log messages.
pub fn actor_label(name: Option<&str>) -> String {
    name.map(str::to_string)
        .unwrap_or_else(|| "System".to_string())
}
