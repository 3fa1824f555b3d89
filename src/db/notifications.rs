use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{Action, Notification};
use super::now;

#[derive(Debug, Default, Clone)]
pub struct NewNotification {
    /// Legacy recipient column; personal alerts such as password changes.
    pub user_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub target_user_id: Option<i64>,
    pub action: Option<Action>,
    pub title: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

/// A log row with actor and target names resolved.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub notification: Notification,
    pub actor_name: Option<String>,
    pub target_name: Option<String>,
}

/// Which rows a user may act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Rows where the user is the legacy recipient.
    Recipient,
    /// Rows where the user is the recipient or the target.
    Involved,
}

impl Scope {
    fn clause(self) -> &'static str {
        match self {
            Scope::Recipient => "user_id = ?1",
            Scope::Involved => "(user_id = ?1 OR target_user_id = ?1)",
        }
    }
}

/// The user column a count is narrowed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Recipient,
    Target,
}

impl Party {
    fn column(self) -> &'static str {
        match self {
            Party::Recipient => "user_id",
            Party::Target => "target_user_id",
        }
    }
}

const JOINED: &str = "SELECT n.*, a.name AS actor_name, t.name AS target_name
     FROM notifications n
     LEFT JOIN users a ON a.id = n.actor_id
     LEFT JOIN users t ON t.id = n.target_user_id";

/// Stores one audit/notification row.
///
/// Most callers go through `services::record`, which logs and swallows
/// failures instead of returning them.
///
/// # Returns
///
/// The stored `Notification` with its id and timestamps
pub async fn insert(pool: &SqlitePool, new: &NewNotification) -> Result<Notification, sqlx::Error> {
    let now = now();
    let details = new.details.as_ref().map(|d| d.to_string());
    sqlx::query_as::<_, Notification>(
        "INSERT INTO notifications
            (user_id, actor_id, target_user_id, action, title, message, details, is_read, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?) RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.actor_id)
    .bind(new.target_user_id)
    .bind(new.action.map(Action::as_str))
    .bind(&new.title)
    .bind(&new.message)
    .bind(details)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// The full audit log, newest first.
pub async fn list_log(pool: &SqlitePool, limit: i64) -> Result<Vec<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "{JOINED} ORDER BY n.created_at DESC, n.id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Rows whose action is one of `actions`, newest first.
///
/// # Arguments
///
/// * `pool` - The SQLite connection pool
/// * `actions` - The action keys to include; must not be empty
/// * `limit` - Maximum number of rows returned
///
/// # Returns
///
/// The matching rows joined with actor and target names
pub async fn list_for_actions(
    pool: &SqlitePool,
    actions: &[Action],
    limit: i64,
) -> Result<Vec<NotificationRow>, sqlx::Error> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("{JOINED} WHERE n.action IN ("));
    let mut keys = query.separated(", ");
    for action in actions {
        keys.push_bind(action.as_str());
    }
    keys.push_unseparated(") ORDER BY n.created_at DESC, n.id DESC LIMIT ");
    query.push_bind(limit);
    query
        .build_query_as::<NotificationRow>()
        .fetch_all(pool)
        .await
}

/// Rows addressed to or about `user_id`, newest first.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<NotificationRow>, sqlx::Error> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "{JOINED} WHERE n.user_id = ?1 OR n.target_user_id = ?1
         ORDER BY n.created_at DESC, n.id DESC LIMIT ?2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Unread rows visible to `user_id` under `scope`.
pub async fn count_unread(pool: &SqlitePool, user_id: i64, scope: Scope) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM notifications WHERE is_read = 0 AND {}",
        scope.clause()
    ))
    .bind(user_id)
    .fetch_one(pool)
    .await
}

/// Unread rows whose target is `user_id`.
pub async fn count_unread_targeting(pool: &SqlitePool, user_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE is_read = 0 AND target_user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Unread rows carrying one of `actions`, optionally narrowed to a target or recipient.
pub async fn count_unread_actions(
    pool: &SqlitePool,
    actions: &[Action],
    narrow: Option<(Party, i64)>,
) -> Result<i64, sqlx::Error> {
    let mut query =
        QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notifications WHERE is_read = 0 AND action IN (");
    let mut keys = query.separated(", ");
    for action in actions {
        keys.push_bind(action.as_str());
    }
    keys.push_unseparated(")");
    if let Some((party, user_id)) = narrow {
        query.push(format!(" AND {} = ", party.column()));
        query.push_bind(user_id);
    }
    query.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Marks a row read if `scope` lets `user_id` see it.
///
/// # Returns
///
/// `false` when the row does not exist or belongs to someone else
pub async fn mark_read(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    scope: Scope,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE notifications SET is_read = 1, updated_at = ?2 WHERE id = ?3 AND {}",
        scope.clause()
    ))
    .bind(user_id)
    .bind(now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a row if `scope` lets `user_id` see it. Returns whether a row went away.
pub async fn delete(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    scope: Scope,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        "DELETE FROM notifications WHERE id = ?2 AND {}",
        scope.clause()
    ))
    .bind(user_id)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::db::{test_pool, users};

    async fn user(pool: &SqlitePool, name: &str) -> i64 {
        users::create(
            pool,
            users::NewUser {
                name,
                email: &format!("{name}@clinic.test"),
                password_hash: "x",
                role: Role::User,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn log_rows_resolve_actor_and_target() {
        let pool = test_pool().await;
        let admin = user(&pool, "boss").await;
        let patient = user(&pool, "pat").await;
        insert(
            &pool,
            &NewNotification {
                actor_id: Some(admin),
                target_user_id: Some(patient),
                action: Some(Action::UserUpdateRole),
                title: "User role updated".into(),
                message: "boss changed role".into(),
                details: Some(serde_json::json!({ "oldRole": "user", "newRole": "staff" })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let rows = list_log(&pool, 200).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].actor_name.as_deref(), Some("boss"));
        assert_eq!(rows[0].target_name.as_deref(), Some("pat"));
        let details: serde_json::Value =
            serde_json::from_str(rows[0].notification.details.as_deref().unwrap()).unwrap();
        assert_eq!(details["newRole"], "staff");
    }

    #[tokio::test]
    async fn scopes_limit_what_a_user_can_touch() {
        let pool = test_pool().await;
        let me = user(&pool, "me").await;
        let other = user(&pool, "other").await;

        let mine = insert(
            &pool,
            &NewNotification {
                target_user_id: Some(me),
                title: "t".into(),
                message: "m".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let theirs = insert(
            &pool,
            &NewNotification {
                user_id: Some(other),
                title: "t".into(),
                message: "m".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(!mark_read(&pool, mine.id, me, Scope::Recipient).await.unwrap());
        assert!(mark_read(&pool, mine.id, me, Scope::Involved).await.unwrap());
        assert!(!delete(&pool, theirs.id, me, Scope::Involved).await.unwrap());
        assert_eq!(count_unread(&pool, other, Scope::Recipient).await.unwrap(), 1);
        assert_eq!(count_unread(&pool, me, Scope::Involved).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn action_filters() {
        let pool = test_pool().await;
        let me = user(&pool, "me").await;
        for action in [
            Action::HandoutRequest,
            Action::HandoutRequest,
            Action::AppointmentRequest,
            Action::MedicineCreate,
        ] {
            insert(
                &pool,
                &NewNotification {
                    action: Some(action),
                    target_user_id: Some(me),
                    title: "t".into(),
                    message: "m".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let feed = list_for_actions(&pool, &[Action::HandoutRequest, Action::AppointmentRequest], 500)
            .await
            .unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(
            count_unread_actions(&pool, &[Action::HandoutRequest], None)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            count_unread_actions(&pool, &[Action::MedicineCreate], Some((Party::Target, me)))
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            count_unread_actions(&pool, &[Action::MedicineCreate], Some((Party::Recipient, me)))
                .await
                .unwrap(),
            0
        );
    }
}
