use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::db::models::Role;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Error,
}

/// A one-shot message shown on the next rendered page.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
    flash: Vec<Flash>,
    last_seen: Instant,
}

/// Server-side sessions keyed by the opaque token stored in the `sid` cookie.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Starts a session and returns its token.
    pub async fn create(&self, user_id: i64, role: Role) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut sessions = self.inner.write().await;
        let ttl = self.ttl;
        sessions.retain(|_, s| s.last_seen.elapsed() < ttl);
        sessions.insert(
            token.clone(),
            Session {
                user_id,
                role,
                flash: Vec::new(),
                last_seen: Instant::now(),
            },
        );
        log::debug!("Session started for user {} ({} live)", user_id, sessions.len());
        token
    }

    /// Looks a session up, refreshing its idle timer. Expired sessions are removed.
    pub async fn get(&self, token: &str) -> Option<Session> {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(token) {
            None => return None,
            Some(session) if session.last_seen.elapsed() < self.ttl => {
                session.last_seen = Instant::now();
                return Some(session.clone());
            }
            Some(_) => {}
        }
        sessions.remove(token);
        log::debug!("Session expired");
        None
    }

    pub async fn destroy(&self, token: &str) {
        self.inner.write().await.remove(token);
    }

    pub async fn flash(&self, token: &str, flash: Flash) {
        if let Some(session) = self.inner.write().await.get_mut(token) {
            session.flash.push(flash);
        }
    }

    pub async fn take_flash(&self, token: &str) -> Vec<Flash> {
        self.inner
            .write()
            .await
            .get_mut(token)
            .map(|s| std::mem::take(&mut s.flash))
            .unwrap_or_default()
    }

    /// Applies a role change to every live session of `user_id`.
    pub async fn update_role(&self, user_id: i64, role: Role) {
        for session in self.inner.write().await.values_mut() {
            if session.user_id == user_id {
                session.role = role;
            }
        }
    }

    /// Ends every session of `user_id`.
    pub async fn drop_user(&self, user_id: i64) {
        self.inner
            .write()
            .await
            .retain(|_, s| s.user_id != user_id);
    }
}
