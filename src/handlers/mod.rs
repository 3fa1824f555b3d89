use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::session::Flash;
use crate::auth::SessionUser;
use crate::db::models::Action;
use crate::db::notifications::{NewNotification, NotificationRow};
use crate::db::users;
use crate::error::AppError;
use crate::services;
use crate::utils::wants_json;
use crate::view::{CurrentUser, Page};
use crate::AppState;

pub mod admin;
pub mod auth;
pub mod inventory;
pub mod inventory_admin;
pub mod staff;
pub mod user;

/// Loads the signed-in user. A session whose account is gone is ended.
pub(crate) async fn current_user(
    state: &AppState,
    session: &SessionUser,
) -> Result<CurrentUser, AppError> {
    match users::find(&state.pool, session.user_id).await? {
        Some(user) => Ok(user.into()),
        None => {
            state.sessions.destroy(&session.token).await;
            Err(AppError::Unauthenticated)
        }
    }
}

/// A page carrying the session's pending flash messages.
pub(crate) async fn page(
    state: &AppState,
    session: &SessionUser,
    view: &'static str,
    title: &str,
) -> Page {
    Page::new(view, title).flash(state.sessions.take_flash(&session.token).await)
}

pub(crate) async fn redirect_with(
    state: &AppState,
    session: &SessionUser,
    to: &str,
    flash: Flash,
) -> Response {
    state.sessions.flash(&session.token, flash).await;
    Redirect::to(to).into_response()
}

/// Rejects a form submission: JSON for XHR clients, flash and redirect otherwise.
pub(crate) async fn reject(
    state: &AppState,
    session: &SessionUser,
    headers: &HeaderMap,
    status: StatusCode,
    back_to: &str,
    message: &str,
) -> Response {
    if wants_json(headers) {
        return (status, Json(json!({ "success": false, "error": message }))).into_response();
    }
    redirect_with(state, session, back_to, Flash::error(message)).await
}

/// Accepts a form submission: `body` for XHR clients, flash and redirect otherwise.
pub(crate) async fn accept(
    state: &AppState,
    session: &SessionUser,
    headers: &HeaderMap,
    to: &str,
    message: &str,
    body: Value,
) -> Response {
    if wants_json(headers) {
        return Json(body).into_response();
    }
    redirect_with(state, session, to, Flash::success(message)).await
}

/// Log row as shown in notification lists.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationView {
    #[serde(flatten)]
    pub row: NotificationRow,
    pub details_str: String,
    pub is_handout_request: bool,
    pub is_appointment_request: bool,
}

impl From<NotificationRow> for NotificationView {
    fn from(row: NotificationRow) -> Self {
        let action = row
            .notification
            .action
            .as_deref()
            .and_then(Action::parse);
        Self {
            details_str: row.notification.details.clone().unwrap_or_default(),
            is_handout_request: action == Some(Action::HandoutRequest),
            is_appointment_request: action == Some(Action::AppointmentRequest),
            row,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordForm {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirm: Option<String>,
}

/// Verifies the old password before storing a new one.
/// Returns the flash to show; errors only for storage failures.
pub(crate) async fn change_password(
    state: &AppState,
    session: &SessionUser,
    form: ChangePasswordForm,
) -> Result<Result<Flash, Flash>, AppError> {
    let (Some(old), Some(new), Some(confirm)) = (
        form.old_password.filter(|s| !s.is_empty()),
        form.new_password.filter(|s| !s.is_empty()),
        form.new_password_confirm.filter(|s| !s.is_empty()),
    ) else {
        return Ok(Err(Flash::error("All fields are required")));
    };
    if new != confirm {
        return Ok(Err(Flash::error("New passwords do not match")));
    }
    let Some(user) = users::find(&state.pool, session.user_id).await? else {
        return Ok(Err(Flash::error("User not found")));
    };
    if !state.passwords.verify_off_thread(old, user.password.clone()).await? {
        log::warn!("Rejected password change for user {}: old password mismatch", user.id);
        return Ok(Err(Flash::error("Old password is incorrect")));
    }

    let hashed = state.passwords.hash_off_thread(new).await?;
    users::update_password(&state.pool, user.id, &hashed).await?;
    services::record(
        &state.pool,
        NewNotification {
            user_id: Some(user.id),
            action: Some(Action::UserPasswordChanged),
            title: "Password changed".into(),
            message: "Your account password was changed.".into(),
            ..Default::default()
        },
    )
    .await;
    log::info!("User {} changed their password", user.id);
    Ok(Ok(Flash::success("Password updated successfully")))
}
