//! Helpers for driving the router in tests.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::password::PasswordHasher;
use crate::auth::session::{SessionStore, SESSION_COOKIE};
use crate::db::models::{Role, User};
use crate::db::{test_pool, users};
use crate::{router, AppState};

pub const PASSWORD: &str = "secret123";

pub async fn state() -> AppState {
    AppState {
        pool: test_pool().await,
        sessions: SessionStore::new(Duration::from_secs(60 * 60)),
        passwords: PasswordHasher::new(1_000),
        low_stock_threshold: 5,
    }
}

/// Creates an account whose password is [`PASSWORD`].
pub async fn user(state: &AppState, name: &str, role: Role) -> User {
    let hash = state.passwords.hash(PASSWORD);
    users::create(
        &state.pool,
        users::NewUser {
            name,
            email: &format!("{}@clinic.test", name.to_lowercase()),
            password_hash: &hash,
            role,
        },
    )
    .await
    .unwrap()
}

/// Starts a session for `user` and returns the matching `Cookie` header value.
pub async fn login(state: &AppState, user: &User) -> String {
    let token = state.sessions.create(user.id, user.role).await;
    format!("{SESSION_COOKIE}={token}")
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

/// A form post from a script expecting a JSON reply.
pub fn post_xhr(uri: &str, cookie: &str, form: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookie)
        .header("x-requested-with", "XMLHttpRequest")
        .body(Body::from(form.to_string()))
        .unwrap()
}

pub async fn send(state: &AppState, request: Request<Body>) -> Response {
    router::build(state.clone()).oneshot(request).await.unwrap()
}

pub async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Asserts a 303 and returns where it points.
pub fn redirected_to(response: &Response) -> String {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Renders `uri` and returns the page JSON.
pub async fn page(state: &AppState, uri: &str, cookie: &str) -> Value {
    let response = send(state, get(uri, Some(cookie))).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
    json(response).await
}
