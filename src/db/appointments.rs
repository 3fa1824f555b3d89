use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;

use super::models::{Appointment, AppointmentStatus};
use super::now;

/// An appointment joined with the patient it belongs to.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub appointment: Appointment,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

pub struct NewAppointment<'a> {
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: Option<&'a str>,
    pub kind: &'a str,
    pub notes: Option<&'a str>,
}

const JOINED: &str = "SELECT a.*, u.name AS user_name, u.email AS user_email
     FROM appointments a
     LEFT JOIN users u ON u.id = a.user_id";

/// Looks up an appointment by primary key.
pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<Appointment>, sqlx::Error> {
    sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Books an appointment for a patient.
///
/// New appointments always start as `pending`; staff move them on from there.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `new` - Patient, date, optional time, type and notes
///
/// # Returns
///
/// The stored `Appointment`
pub async fn create(pool: &SqlitePool, new: NewAppointment<'_>) -> Result<Appointment, sqlx::Error> {
    let now = now();
    sqlx::query_as::<_, Appointment>(
        "INSERT INTO appointments (user_id, date, time, type, status, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.date)
    .bind(new.time)
    .bind(new.kind)
    .bind(AppointmentStatus::Pending)
    .bind(new.notes)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Every appointment with patient details, latest date first.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<AppointmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentRow>(&format!("{JOINED} ORDER BY a.date DESC, a.id DESC"))
        .fetch_all(pool)
        .await
}

/// The `limit` most recent appointments with patient details.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<AppointmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AppointmentRow>(&format!(
        "{JOINED} ORDER BY a.date DESC, a.time DESC, a.id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// A patient's appointments, latest date first.
pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Appointment>, sqlx::Error> {
    sqlx::query_as::<_, Appointment>(
        "SELECT * FROM appointments WHERE user_id = ? ORDER BY date DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Appointments on or after `from`, soonest first.
pub async fn upcoming_for_user(
    pool: &SqlitePool,
    user_id: i64,
    from: NaiveDate,
) -> Result<Vec<Appointment>, sqlx::Error> {
    sqlx::query_as::<_, Appointment>(
        "SELECT * FROM appointments WHERE user_id = ? AND date >= ?
         ORDER BY date ASC, time ASC, id ASC",
    )
    .bind(user_id)
    .bind(from)
    .fetch_all(pool)
    .await
}

pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM appointments")
        .fetch_one(pool)
        .await
}

/// Number of appointments currently in `status`.
pub async fn count_by_status(
    pool: &SqlitePool,
    status: AppointmentStatus,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE status = ?")
        .bind(status)
        .fetch_one(pool)
        .await
}

/// Moves an appointment to `next` only if it is still in `from`.
/// Returns false when the row changed underneath the caller.
pub async fn transition(
    pool: &SqlitePool,
    id: i64,
    from: AppointmentStatus,
    next: AppointmentStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE appointments SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(next)
    .bind(now())
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}
