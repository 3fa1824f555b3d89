use sqlx::SqlitePool;

use super::models::{Role, User};
use super::now;

pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

/// Looks up a user by primary key.
pub async fn find(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Looks up a user by login email.
///
/// Emails are unique, so at most one row matches.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `email` - The email exactly as the user typed it at login
///
/// # Returns
///
/// The matching `User`, or `None` when nobody registered with that email
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Inserts a new account. The caller hashes the password first.
///
/// # Returns
///
/// The stored `User`, or a unique-constraint error if the email is taken
pub async fn create(pool: &SqlitePool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
    let now = now();
    sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, password, role, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(new.name)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.role)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Every account, sorted by name.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name ASC")
        .fetch_all(pool)
        .await
}

/// Accounts holding `role`, sorted by name.
pub async fn list_by_role(pool: &SqlitePool, role: Role) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = ? ORDER BY name ASC")
        .bind(role)
        .fetch_all(pool)
        .await
}

/// The newest `limit` accounts.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC, id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Total number of accounts.
pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
}

/// Number of accounts holding `role`.
pub async fn count_by_role(pool: &SqlitePool, role: Role) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
        .bind(role)
        .fetch_one(pool)
        .await
}

/// Changes an account's role.
///
/// Live sessions keep their old role until the session store is told about
/// the change, so callers update both.
pub async fn update_role(pool: &SqlitePool, id: i64, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Replaces the stored password hash.
pub async fn update_password(
    pool: &SqlitePool,
    id: i64,
    password_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Sets name and email. Email uniqueness is checked by the caller and the schema.
pub async fn update_profile(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    email: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(email)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Overwrites name, password and role of an existing account.
pub async fn overwrite(pool: &SqlitePool, id: i64, new: NewUser<'_>) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET name = ?, password = ?, role = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(new.name)
    .bind(new.password_hash)
    .bind(new.role)
    .bind(now())
    .bind(id)
    .fetch_one(pool)
    .await
}

/// Removes an account.
///
/// # Returns
///
/// `true` when a row was deleted, `false` if the id did not exist
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
