// In-memory session table
// Binds opaque 32-char tokens to (user id, role). Sessions never touch the
// image and do not survive a server restart.

use log::debug;
use omnifs_core::{OmniError, Role};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;

pub const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: u32,
    pub username: String,
    pub role: Role,
    pub login_time: u64,
    pub last_activity: u64,
}

#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for an authenticated user.
    pub fn login(&mut self, user_id: u32, username: &str, role: Role, now: u64) -> String {
        let token = loop {
            let candidate: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(TOKEN_LEN)
                .map(char::from)
                .collect();
            if !self.sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        self.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                user_id,
                username: username.to_string(),
                role,
                login_time: now,
                last_activity: now,
            },
        );
        debug!("session opened for '{}' ({} active)", username, self.sessions.len());
        token
    }

    pub fn resolve(&self, token: &str) -> Option<&Session> {
        self.sessions.get(token)
    }

    pub fn touch(&mut self, token: &str, now: u64) {
        if let Some(session) = self.sessions.get_mut(token) {
            session.last_activity = now;
        }
    }

    pub fn invalidate(&mut self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Drop every session bound to a user; used when the user is deleted.
    pub fn invalidate_for_user(&mut self, user_id: u32) {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            debug!("invalidated {} session(s) for user {}", dropped, user_id);
        }
    }

    /// The session for a token, or `InvalidSession`.
    pub fn require_session(&self, token: &str) -> Result<&Session, OmniError> {
        self.resolve(token).ok_or(OmniError::InvalidSession)
    }

    /// The session for a token, refusing non-admin callers.
    pub fn require_admin(&self, token: &str) -> Result<&Session, OmniError> {
        let session = self.require_session(token)?;
        if session.role != Role::Admin {
            return Err(OmniError::PermissionDenied(
                "administrator privileges required".to_string(),
            ));
        }
        Ok(session)
    }
}
