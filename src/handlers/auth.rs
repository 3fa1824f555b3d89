use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use serde_json::json;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::auth::session::{Flash, SESSION_COOKIE};
use crate::auth::SessionUser;
use crate::db::models::{Action, Role, User};
use crate::db::notifications::NewNotification;
use crate::db::users;
use crate::error::AppError;
use crate::services;
use crate::utils::non_empty;
use crate::view::Page;
use crate::AppState;

pub async fn home() -> Page {
    Page::new("home", "Home")
}

pub async fn contact() -> Page {
    Page::new("contact", "Contact")
}

pub async fn forgot_password() -> Page {
    Page::new("forgot-password", "Forgot Password")
}

pub async fn login_page(session: Option<SessionUser>) -> Response {
    match session {
        Some(session) => Redirect::to(session.role.dashboard_path()).into_response(),
        None => Page::new("login", "Login").into_response(),
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

/// `POST /login`: checks the credentials and starts a session.
///
/// A failed attempt re-renders the login page with the reason. A success
/// redirects to the dashboard for the user's role.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let failed = |message: &str| -> Result<Response, AppError> {
        Ok(Page::new("login", "Login").error(message).into_response())
    };

    let (Some(email), Some(password)) = (non_empty(form.email), form.password) else {
        return failed("Email and password are required");
    };
    let Some(user) = users::find_by_email(&state.pool, &email).await? else {
        return failed("User not found");
    };
    let verified = state
        .passwords
        .verify_off_thread(password, user.password.clone())
        .await
        .unwrap_or_else(|e| {
            log::warn!("Stored password for user {} is unreadable: {}", user.id, e);
            false
        });
    if !verified {
        log::info!("Failed login for user {}", user.id);
        return failed("Incorrect password");
    }

    start_session(&state, &cookies, &user).await;
    log::info!("User {} logged in as {}", user.id, user.role);
    Ok(Redirect::to(user.role.dashboard_path()).into_response())
}

/// Replaces any session the browser holds with a fresh one for `user`.
async fn start_session(state: &AppState, cookies: &Cookies, user: &User) {
    if let Some(old) = cookies.get(SESSION_COOKIE) {
        state.sessions.destroy(old.value()).await;
    }
    let token = state.sessions.create(user.id, user.role).await;
    cookies.add(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    );
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RegisterQuery {
    show_role: Option<String>,
}

pub async fn register_page(
    session: Option<SessionUser>,
    Query(query): Query<RegisterQuery>,
) -> Page {
    let is_admin = session.is_some_and(|s| s.role == Role::Admin);
    let show_role = is_admin || query.show_role.as_deref() == Some("1");
    Page::new("register", "Register").data(json!({ "showRole": show_role, "isAdmin": is_admin }))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    password_confirm: Option<String>,
    role: Option<String>,
}

/// `POST /register`: creates an account.
///
/// Only an admin session may choose the role; everyone else becomes a
/// patient and is signed in straight away.
pub async fn register(
    State(state): State<AppState>,
    session: Option<SessionUser>,
    cookies: Cookies,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let admin = session.filter(|s| s.role == Role::Admin);
    let failed = |message: &str| -> Result<Response, AppError> {
        Ok(Page::new("register", "Register")
            .error(message)
            .data(json!({ "showRole": admin.is_some(), "isAdmin": admin.is_some() }))
            .into_response())
    };

    let (Some(name), Some(email), Some(password), Some(confirm)) = (
        non_empty(form.name),
        non_empty(form.email),
        form.password.filter(|p| !p.is_empty()),
        form.password_confirm.filter(|p| !p.is_empty()),
    ) else {
        return failed("All fields are required.");
    };
    if password != confirm {
        return failed("Passwords do not match.");
    }
    if users::find_by_email(&state.pool, &email).await?.is_some() {
        return failed("Email already registered. Please login.");
    }

    // only admins pick roles; everyone else registers as a patient
    let role = match (&admin, form.role.as_deref()) {
        (Some(_), Some(requested)) => requested.parse().unwrap_or(Role::User),
        _ => Role::User,
    };

    let hash = state.passwords.hash_off_thread(password).await?;
    let user = users::create(
        &state.pool,
        users::NewUser {
            name: &name,
            email: &email,
            password_hash: &hash,
            role,
        },
    )
    .await?;

    services::record(
        &state.pool,
        NewNotification {
            actor_id: admin.as_ref().map(|a| a.user_id),
            target_user_id: Some(user.id),
            action: Some(Action::UserCreate),
            title: "User created".into(),
            message: format!("Account created for {} ({})", user.name, user.role),
            details: Some(json!({ "email": user.email, "role": user.role })),
            ..Default::default()
        },
    )
    .await;
    log::info!("Registered user {} with role {}", user.id, user.role);

    match admin {
        Some(admin) => {
            state
                .sessions
                .flash(&admin.token, Flash::success(format!("User {} created", user.name)))
                .await;
            Ok(Redirect::to("/admin/users").into_response())
        }
        None => {
            start_session(&state, &cookies, &user).await;
            Ok(Redirect::to(user.role.dashboard_path()).into_response())
        }
    }
}

/// Ends the session and clears the cookie.
pub async fn logout(
    State(state): State<AppState>,
    session: Option<SessionUser>,
    cookies: Cookies,
) -> Redirect {
    if let Some(session) = session {
        state.sessions.destroy(&session.token).await;
        log::info!("User {} logged out", session.user_id);
    }
    cookies.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Redirect::to("/login")
}

/// Sends each role to its own dashboard.
pub async fn dashboard(session: Option<SessionUser>) -> Redirect {
    match session {
        Some(session) => Redirect::to(session.role.dashboard_path()),
        None => Redirect::to("/login"),
    }
}

pub async fn appointments(session: Option<SessionUser>) -> Redirect {
    match session {
        Some(session) => Redirect::to(session.role.appointments_path()),
        None => Redirect::to("/login"),
    }
}
