//! View models handed to the external renderer.
//!
//! A page is a JSON document naming the template to render plus the data it
//! consumes. Templates live outside this service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::auth::session::Flash;
use crate::db::models::{Role, User};

#[derive(Serialize, Debug)]
pub struct Page {
    #[serde(skip)]
    status: StatusCode,
    pub view: &'static str,
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flash: Vec<Flash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub data: Value,
}

impl Page {
    pub fn new(view: &'static str, title: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            view,
            title: title.into(),
            flash: Vec::new(),
            error: None,
            data: Value::Object(Default::default()),
        }
    }

    pub fn data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).unwrap_or_else(|e| {
            log::error!("Failed to serialize view model for {}: {}", self.view, e);
            Value::Null
        });
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn flash(mut self, flash: Vec<Flash>) -> Self {
        self.flash = flash;
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for Page {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// The signed-in user as shown in page chrome.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar_url: Option<String>,
}

impl From<User> for CurrentUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            role: u.role,
            avatar_url: u.avatar_url,
        }
    }
}
