//! Password hashing, bearer sessions and role checks.

use anyhow::anyhow;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::SharedState;
use crate::config::AuthConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Lecturer,
    Student,
    Finance,
    Hr,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Lecturer,
        Role::Student,
        Role::Finance,
        Role::Hr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Lecturer => "lecturer",
            Role::Student => "student",
            Role::Finance => "finance",
            Role::Hr => "hr",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ApiError::bad_params(format!("unknown role: {}", s)))
    }
}

/// The authenticated caller, attached to request extensions by [`attach_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    /// Admin always passes.
    pub fn require(&self, roles: &[Role]) -> Result<(), ApiError> {
        if self.role == Role::Admin || roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not perform this action",
                self.role
            )))
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "email": self.email,
            "fullName": self.full_name,
            "role": self.role,
        })
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

fn sha256_hex(input: &[u8]) -> String {
    format!("{:x}", Sha256::digest(input))
}

/// Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| anyhow!("failed to encode password salt: {}", e))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a stored value that is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parsed = match PasswordHash::new(stored) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "stored password hash is unreadable");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_new_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(ApiError::bad_params(
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Issue a new opaque token for `user_id`. Only its hash is stored.
pub fn create_session(
    conn: &Connection,
    user_id: &str,
    ttl_hours: i64,
) -> Result<(String, String), ApiError> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let now = Utc::now();
    let expires_at = (now + Duration::hours(ttl_hours)).to_rfc3339();
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (
            sha256_hex(token.as_bytes()),
            user_id,
            now.to_rfc3339(),
            &expires_at,
        ),
    )?;
    Ok((token, expires_at))
}

pub fn revoke_session(conn: &Connection, token: &str) -> Result<bool, ApiError> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?",
        [sha256_hex(token.as_bytes())],
    )?;
    Ok(n > 0)
}

pub fn revoke_user_sessions(conn: &Connection, user_id: &str) -> Result<usize, ApiError> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?", [user_id])?)
}

/// Resolve a token to an active user. Expired sessions are removed.
pub fn resolve_session(conn: &Connection, token: &str) -> Result<Option<CurrentUser>, ApiError> {
    let hash = sha256_hex(token.as_bytes());
    let row = conn
        .query_row(
            "SELECT u.id, u.email, u.full_name, u.role, u.active, s.expires_at
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?",
            [&hash],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)? != 0,
                    r.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, email, full_name, role, active, expires_at)) = row else {
        return Ok(None);
    };

    let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
        .map(|t| t.with_timezone(&Utc) <= Utc::now())
        .unwrap_or(true);
    if expired {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?", [&hash])?;
        return Ok(None);
    }
    if !active {
        return Ok(None);
    }

    Ok(Some(CurrentUser {
        id,
        email,
        full_name,
        role: role.parse()?,
    }))
}

pub fn purge_expired_sessions(conn: &Connection) -> Result<usize, ApiError> {
    Ok(conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?",
        [Utc::now().to_rfc3339()],
    )?)
}

/// Create the configured admin account when no users exist yet.
pub fn ensure_bootstrap_admin(conn: &Connection, config: &AuthConfig) -> anyhow::Result<bool> {
    let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    if users > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO users(id, email, password_hash, full_name, role, active, created_at)
         VALUES(?, ?, ?, ?, 'admin', 1, ?)",
        (
            Uuid::new_v4().to_string(),
            config.bootstrap_admin_email.trim().to_ascii_lowercase(),
            hash_password(&config.bootstrap_admin_password)?,
            "Administrator",
            Utc::now().to_rfc3339(),
        ),
    )?;
    info!(email = %config.bootstrap_admin_email, "created bootstrap admin account");
    Ok(true)
}

/// Attach the caller behind a valid bearer token to the request. Requests
/// without a usable token pass through anonymously; handlers that need a
/// user reject them via the [`CurrentUser`] extractor.
pub async fn attach_user(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(req.headers()).map(str::to_string) {
        let resolved = match state.conn() {
            Ok(conn) => resolve_session(&conn, &token),
            Err(e) => Err(e),
        };
        match resolved {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(e) => return e.into_response(),
        }
    }
    next.run(req).await
}
