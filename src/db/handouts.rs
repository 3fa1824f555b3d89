use serde::Serialize;
use sqlx::SqlitePool;

use super::models::{Handout, HandoutStatus};
use super::now;

/// A handout joined with its medicine and (optional) patient.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HandoutRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub handout: Handout,
    pub medicine_name: String,
    pub medicine_unit: Option<String>,
    pub user_name: Option<String>,
}

const JOINED: &str = "SELECT h.*, m.name AS medicine_name, m.unit AS medicine_unit, u.name AS user_name
     FROM handouts h
     JOIN medicines m ON m.id = h.medicine_id
     LEFT JOIN users u ON u.id = h.user_id";

/// Looks up a handout by primary key, without joins.
pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Handout>, sqlx::Error> {
    sqlx::query_as::<_, Handout>("SELECT * FROM handouts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Records a patient request; stock is untouched until staff approve it.
pub async fn create_request(
    pool: &SqlitePool,
    medicine_id: i64,
    user_id: i64,
    quantity: i64,
    notes: Option<&str>,
) -> Result<Handout, sqlx::Error> {
    let now = now();
    sqlx::query_as::<_, Handout>(
        "INSERT INTO handouts (medicine_id, user_id, quantity, notes, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(medicine_id)
    .bind(user_id)
    .bind(quantity)
    .bind(notes)
    .bind(HandoutStatus::Requested)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Every handout with medicine and patient names, newest first.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<HandoutRow>, sqlx::Error> {
    sqlx::query_as::<_, HandoutRow>(&format!("{JOINED} ORDER BY h.created_at DESC, h.id DESC"))
        .fetch_all(pool)
        .await
}

/// A patient's own handouts, newest first.
pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<HandoutRow>, sqlx::Error> {
    sqlx::query_as::<_, HandoutRow>(&format!(
        "{JOINED} WHERE h.user_id = ? ORDER BY h.created_at DESC, h.id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Handouts carrying a staff or patient note, for the staff notes page.
pub async fn list_with_notes(pool: &SqlitePool) -> Result<Vec<HandoutRow>, sqlx::Error> {
    sqlx::query_as::<_, HandoutRow>(&format!(
        "{JOINED} WHERE h.notes IS NOT NULL AND h.notes <> '' ORDER BY h.created_at DESC, h.id DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM handouts")
        .fetch_one(pool)
        .await
}

/// Counts the handouts recorded for a patient.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `user_id` - The patient whose handouts are counted
///
/// # Returns
///
/// The number of handouts in any status
pub async fn count_for_user(pool: &SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM handouts WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
}
