use axum::extract::{Path, State};
use axum::response::{Redirect, Response};
use axum::Form;
use serde::Deserialize;
use serde_json::json;

use super::{change_password, current_user, page, redirect_with, staff, ChangePasswordForm, NotificationView};
use crate::auth::session::Flash;
use crate::auth::AdminUser;
use crate::db::models::{Action, AppointmentStatus, Role};
use crate::db::notifications::{self, NewNotification, Scope};
use crate::db::{appointments, handouts, medicines, users};
use crate::error::AppError;
use crate::services::{self, actor_label};
use crate::view::Page;
use crate::AppState;

/// `GET /admin/dashboard`: headline counts plus the admin's unread notifications.
pub async fn dashboard(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    let pool = &state.pool;
    let (user_count, medicine_count, handout_count, appointment_count, notif_count) = futures::try_join!(
        users::count(pool),
        medicines::count(pool),
        handouts::count(pool),
        appointments::count(pool),
        notifications::count_unread(pool, user.id, Scope::Recipient),
    )?;
    Ok(page(&state, &admin, "admin/dashboard", "Admin Dashboard")
        .await
        .data(json!({
            "user": user,
            "stats": {
                "users": user_count,
                "medicines": medicine_count,
                "handouts": handout_count,
                "appointments": appointment_count,
            },
            "notifCount": notif_count,
        })))
}

pub async fn users(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    let all = users::list_all(&state.pool).await?;
    Ok(page(&state, &admin, "admin/users", "Manage Users")
        .await
        .data(json!({ "user": user, "users": all, "roles": ["admin", "staff", "user"] })))
}

pub async fn settings(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    Ok(page(&state, &admin, "admin/settings", "Settings")
        .await
        .data(json!({ "user": user })))
}

pub async fn profile(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    Ok(page(&state, &admin, "admin/profile", "Profile")
        .await
        .data(json!({ "user": user })))
}

pub async fn appointments(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    staff::appointment_list(&state, &admin).await
}

/// `GET /admin/reports`: totals, low stock, appointments by status and recent activity.
pub async fn reports(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    let pool = &state.pool;
    let (user_count, medicine_count, handout_count, appointment_count, low_stock) = futures::try_join!(
        users::count(pool),
        medicines::count(pool),
        handouts::count(pool),
        appointments::count(pool),
        medicines::count_low_stock(pool, state.low_stock_threshold),
    )?;
    let (pending, completed, cancelled) = futures::try_join!(
        appointments::count_by_status(pool, AppointmentStatus::Pending),
        appointments::count_by_status(pool, AppointmentStatus::Completed),
        appointments::count_by_status(pool, AppointmentStatus::Cancelled),
    )?;
    let recent_users = users::recent(pool, 6).await?;
    let recent_appointments = appointments::recent(pool, 8).await?;

    Ok(page(&state, &admin, "admin/reports", "Reports")
        .await
        .data(json!({
            "user": user,
            "counts": {
                "users": user_count,
                "medicines": medicine_count,
                "handouts": handout_count,
                "appointments": appointment_count,
                "lowStock": low_stock,
                "lowStockThreshold": state.low_stock_threshold,
            },
            "appointmentsByStatus": {
                "pending": pending,
                "completed": completed,
                "cancelled": cancelled,
            },
            "recentUsers": recent_users,
            "recentAppointments": recent_appointments,
        })))
}

/// `GET /admin/notifications`: the full audit log, newest first.
pub async fn notifications(State(state): State<AppState>, admin: AdminUser) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    let rows = notifications::list_log(&state.pool, 200).await?;
    let notif_count = notifications::count_unread_targeting(&state.pool, user.id).await?;
    let rows: Vec<NotificationView> = rows.into_iter().map(NotificationView::from).collect();
    Ok(page(&state, &admin, "admin/notifications", "Notifications")
        .await
        .data(json!({ "user": user, "notifications": rows, "notifCount": notif_count })))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    if !notifications::mark_read(&state.pool, id, admin.user_id, Scope::Recipient).await? {
        log::debug!("Notification {} not marked read for admin {}", id, admin.user_id);
    }
    Ok(Redirect::to("/admin/notifications"))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Redirect, AppError> {
    if !notifications::delete(&state.pool, id, admin.user_id, Scope::Recipient).await? {
        log::debug!("Notification {} not deleted for admin {}", id, admin.user_id);
    }
    Ok(Redirect::to("/admin/notifications"))
}

pub async fn change_password_page(
    State(state): State<AppState>,
    admin: AdminUser,
) -> Result<Page, AppError> {
    let user = current_user(&state, &admin).await?;
    Ok(page(&state, &admin, "admin/change-password", "Change Password")
        .await
        .data(json!({ "user": user })))
}

pub async fn change_password_submit(
    State(state): State<AppState>,
    admin: AdminUser,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, AppError> {
    let flash = match change_password(&state, &admin, form).await? {
        Ok(flash) | Err(flash) => flash,
    };
    Ok(redirect_with(&state, &admin, "/admin/change-password", flash).await)
}

#[derive(Deserialize, Debug)]
pub struct RoleForm {
    role: Option<String>,
}

/// `POST /admin/users/:id/edit`: changes a user's role.
///
/// The new role reaches the user's live sessions immediately, so a demoted
/// admin loses access on their next request.
pub async fn edit_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Form(form): Form<RoleForm>,
) -> Result<Response, AppError> {
    let Some(role) = form.role.as_deref().and_then(|r| r.parse::<Role>().ok()) else {
        return Ok(redirect_with(&state, &admin, "/admin/users", Flash::error("Invalid role")).await);
    };
    let Some(target) = users::find(&state.pool, id).await? else {
        return Ok(redirect_with(&state, &admin, "/admin/users", Flash::error("User not found")).await);
    };
    let actor = users::find(&state.pool, admin.user_id).await?;

    users::update_role(&state.pool, target.id, role).await?;
    state.sessions.update_role(target.id, role).await;

    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(admin.user_id),
            target_user_id: Some(target.id),
            action: Some(Action::UserUpdateRole),
            title: "User role updated".into(),
            message: format!(
                "{} changed {}'s role from {} to {}",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                target.name,
                target.role,
                role
            ),
            details: Some(json!({ "oldRole": target.role, "newRole": role })),
            ..Default::default()
        },
    )
    .await;
    log::info!(
        "Admin {} changed role of user {} from {} to {}",
        admin.user_id,
        target.id,
        target.role,
        role
    );

    Ok(redirect_with(
        &state,
        &admin,
        "/admin/users",
        Flash::success(format!("{} is now {}", target.name, role)),
    )
    .await)
}

/// `POST /admin/users/:id/delete`: removes an account and signs it out everywhere.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    if id == admin.user_id {
        return Ok(redirect_with(
            &state,
            &admin,
            "/admin/users",
            Flash::error("You cannot delete your own account"),
        )
        .await);
    }
    let Some(target) = users::find(&state.pool, id).await? else {
        return Ok(redirect_with(&state, &admin, "/admin/users", Flash::error("User not found")).await);
    };
    let actor = users::find(&state.pool, admin.user_id).await?;

    users::delete(&state.pool, target.id).await?;
    state.sessions.drop_user(target.id).await;

    services::record(
        &state.pool,
        NewNotification {
            actor_id: Some(admin.user_id),
            target_user_id: Some(target.id),
            action: Some(Action::UserDelete),
            title: "User deleted".into(),
            message: format!(
                "{} deleted {} ({})",
                actor_label(actor.as_ref().map(|a| a.name.as_str())),
                target.name,
                target.email
            ),
            details: Some(json!({ "email": target.email, "role": target.role })),
            ..Default::default()
        },
    )
    .await;
    log::info!("Admin {} deleted user {}", admin.user_id, target.id);

    Ok(redirect_with(
        &state,
        &admin,
        "/admin/users",
        Flash::success(format!("Deleted {}", target.name)),
    )
    .await)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::models::{Action, Role};
    use crate::db::notifications::{self, NewNotification};
    use crate::db::{medicines, users};
    use crate::testing::{self, PASSWORD};

    #[tokio::test]
    async fn non_admins_are_turned_away() {
        let state = testing::state().await;
        let staff = testing::user(&state, "Sam", Role::Staff).await;
        let cookie = testing::login(&state, &staff).await;

        let response = testing::send(&state, testing::get("/admin/dashboard", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(testing::json(response).await["error"], "Access denied");

        let response = testing::send(&state, testing::get("/admin/dashboard", None)).await;
        assert_eq!(testing::redirected_to(&response), "/login");
    }

    #[tokio::test]
    async fn dashboard_counts() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        testing::user(&state, "Pat", Role::User).await;
        medicines::seed(&state.pool, "Paracetamol", 10).await;
        let cookie = testing::login(&state, &admin).await;

        let page = testing::page(&state, "/admin/dashboard", &cookie).await;
        assert_eq!(page["view"], "admin/dashboard");
        assert_eq!(page["data"]["stats"]["users"], 2);
        assert_eq!(page["data"]["stats"]["medicines"], 1);
        assert_eq!(page["data"]["user"]["name"], "Root");
        assert!(page["data"]["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn reports_count_low_stock_at_threshold() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        medicines::seed(&state.pool, "Low", 5).await;
        medicines::seed(&state.pool, "Plenty", 6).await;
        let cookie = testing::login(&state, &admin).await;

        let page = testing::page(&state, "/admin/reports", &cookie).await;
        assert_eq!(page["data"]["counts"]["lowStock"], 1);
        assert_eq!(page["data"]["recentUsers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn role_change_reaches_live_session_and_is_audited() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let pat = testing::user(&state, "Pat", Role::User).await;
        let admin_cookie = testing::login(&state, &admin).await;
        let pat_cookie = testing::login(&state, &pat).await;

        let response = testing::send(
            &state,
            testing::post(&format!("/admin/users/{}/edit", pat.id), Some(&admin_cookie), "role=staff"),
        )
        .await;
        assert_eq!(testing::redirected_to(&response), "/admin/users");
        assert_eq!(
            users::find(&state.pool, pat.id).await.unwrap().unwrap().role,
            Role::Staff
        );

        let page = testing::page(&state, "/staff/dashboard", &pat_cookie).await;
        assert_eq!(page["view"], "staff/dashboard");

        let log = notifications::list_log(&state.pool, 10).await.unwrap();
        assert_eq!(log[0].notification.action.as_deref(), Some(Action::UserUpdateRole.as_str()));
        let details: serde_json::Value =
            serde_json::from_str(log[0].notification.details.as_deref().unwrap()).unwrap();
        assert_eq!(details["oldRole"], "user");
        assert_eq!(details["newRole"], "staff");
    }

    #[tokio::test]
    async fn invalid_role_is_rejected() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let pat = testing::user(&state, "Pat", Role::User).await;
        let cookie = testing::login(&state, &admin).await;

        testing::send(
            &state,
            testing::post(&format!("/admin/users/{}/edit", pat.id), Some(&cookie), "role=owner"),
        )
        .await;
        let page = testing::page(&state, "/admin/users", &cookie).await;
        assert_eq!(page["flash"][0]["message"], "Invalid role");
        assert_eq!(
            users::find(&state.pool, pat.id).await.unwrap().unwrap().role,
            Role::User
        );
    }

    #[tokio::test]
    async fn deleting_users() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let pat = testing::user(&state, "Pat", Role::User).await;
        let admin_cookie = testing::login(&state, &admin).await;
        let pat_cookie = testing::login(&state, &pat).await;

        testing::send(
            &state,
            testing::post(&format!("/admin/users/{}/delete", admin.id), Some(&admin_cookie), ""),
        )
        .await;
        let page = testing::page(&state, "/admin/users", &admin_cookie).await;
        assert_eq!(page["flash"][0]["message"], "You cannot delete your own account");

        testing::send(
            &state,
            testing::post(&format!("/admin/users/{}/delete", pat.id), Some(&admin_cookie), ""),
        )
        .await;
        assert!(users::find(&state.pool, pat.id).await.unwrap().is_none());
        let response = testing::send(&state, testing::get("/user/dashboard", Some(&pat_cookie))).await;
        assert_eq!(testing::redirected_to(&response), "/login");

        let log = notifications::list_log(&state.pool, 10).await.unwrap();
        assert_eq!(log[0].notification.action.as_deref(), Some(Action::UserDelete.as_str()));
        assert_eq!(log[0].target_name, None);
    }

    #[tokio::test]
    async fn password_change_requires_the_old_password() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;

        testing::send(
            &state,
            testing::post(
                "/admin/change-password",
                Some(&cookie),
                "oldPassword=nope&newPassword=fresh1&newPasswordConfirm=fresh1",
            ),
        )
        .await;
        let page = testing::page(&state, "/admin/change-password", &cookie).await;
        assert_eq!(page["flash"][0]["message"], "Old password is incorrect");

        testing::send(
            &state,
            testing::post(
                "/admin/change-password",
                Some(&cookie),
                &format!("oldPassword={PASSWORD}&newPassword=fresh1&newPasswordConfirm=fresh1"),
            ),
        )
        .await;
        let page = testing::page(&state, "/admin/change-password", &cookie).await;
        assert_eq!(page["flash"][0]["kind"], "success");

        let stored = users::find(&state.pool, admin.id).await.unwrap().unwrap();
        assert!(state.passwords.verify("fresh1", &stored.password).unwrap());
        let unread = notifications::count_unread(
            &state.pool,
            admin.id,
            notifications::Scope::Recipient,
        )
        .await
        .unwrap();
        assert_eq!(unread, 1);
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_the_admin() {
        let state = testing::state().await;
        let admin = testing::user(&state, "Root", Role::Admin).await;
        let other = testing::user(&state, "Other", Role::Admin).await;
        let cookie = testing::login(&state, &admin).await;
        let theirs = notifications::insert(
            &state.pool,
            &NewNotification {
                user_id: Some(other.id),
                title: "Password changed".into(),
                message: "m".into(),
                details: Some(serde_json::json!({ "k": 1 })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let page = testing::page(&state, "/admin/notifications", &cookie).await;
        assert_eq!(page["data"]["notifications"][0]["detailsStr"], "{\"k\":1}");

        testing::send(
            &state,
            testing::post(
                &format!("/admin/notifications/{}/delete", theirs.id),
                Some(&cookie),
                "",
            ),
        )
        .await;
        assert_eq!(notifications::list_log(&state.pool, 10).await.unwrap().len(), 1);
    }
}
