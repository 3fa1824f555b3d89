use std::ops::Deref;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tower_cookies::Cookies;

use super::session::SESSION_COOKIE;
use crate::db::models::Role;
use crate::error::{ApiError, AppError};
use crate::AppState;

/// Any signed-in user. Anonymous requests are sent to the login page.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub token: String,
    pub user_id: i64,
    pub role: Role,
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::Internal(msg.to_string()))?;
        let token = cookies
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(AppError::Unauthenticated)?;
        let session = state
            .sessions
            .get(&token)
            .await
            .ok_or(AppError::Unauthenticated)?;
        Ok(SessionUser {
            token,
            user_id: session.user_id,
            role: session.role,
        })
    }
}

async fn gate(
    parts: &mut Parts,
    state: &AppState,
    allowed: fn(Role) -> bool,
) -> Result<SessionUser, AppError> {
    let user = SessionUser::from_request_parts(parts, state).await?;
    if !allowed(user.role) {
        log::warn!(
            "User {} ({}) denied access to {}",
            user.user_id,
            user.role,
            parts.uri.path()
        );
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

macro_rules! role_gate {
    ($(#[$doc:meta])* $name:ident, $allowed:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(pub SessionUser);

        #[async_trait]
        impl FromRequestParts<AppState> for $name {
            type Rejection = AppError;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                gate(parts, state, $allowed).await.map($name)
            }
        }

        impl Deref for $name {
            type Target = SessionUser;
            fn deref(&self) -> &SessionUser {
                &self.0
            }
        }
    };
}

role_gate!(
    /// Admins only.
    AdminUser,
    |role| role == Role::Admin
);
role_gate!(
    /// Admins and staff.
    StaffUser,
    Role::is_staff_or_admin
);
role_gate!(
    /// Staff only; admins manage the same data from their own pages.
    StaffOnly,
    |role| role == Role::Staff
);

/// A signed-in user on a JSON endpoint; anonymous callers get a 401 body.
#[derive(Debug, Clone)]
pub struct ApiUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for ApiUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        SessionUser::from_request_parts(parts, state)
            .await
            .map(ApiUser)
            .map_err(|_| ApiError::Unauthenticated)
    }
}

impl Deref for ApiUser {
    type Target = SessionUser;
    fn deref(&self) -> &SessionUser {
        &self.0
    }
}
