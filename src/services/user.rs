//! School user service — upsert and lookup keyed by email.
//!
//! User records replicate through the same school namespace the absence
//! records use. The submitted password is digested with SHA-256 before it
//! is stored or relayed; clients compare digests at login.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::frame::ErrorCode for UserError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// A user record as clients submit it over the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub role: String,
    pub email: String,
    pub password: String,
}

/// A stored school user. The raw password never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolUser {
    pub id: Uuid,
    pub school_code: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub password_hash: String,
}

// =============================================================================
// NORMALIZATION
// =============================================================================

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    if normalized.is_empty() || !normalized.contains('@') {
        return None;
    }
    let parts = normalized.split('@').collect::<Vec<_>>();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    let bytes = hasher.finalize();
    bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
}

// =============================================================================
// SYNC / FIND
// =============================================================================

/// Upsert a user under `(school_code, email)`. Returns the stored record.
///
/// # Errors
///
/// Returns [`UserError::InvalidEmail`] for a malformed address, or a
/// database error if the upsert fails.
pub async fn sync_user(
    pool: &PgPool,
    school_code: &str,
    payload: UserPayload,
) -> Result<SchoolUser, UserError> {
    let email = normalize_email(&payload.email).ok_or(UserError::InvalidEmail)?;
    let id = payload.id.unwrap_or_else(Uuid::new_v4);
    let password_hash = hash_password(&payload.password);

    let row: (Uuid,) = sqlx::query_as(
        r"INSERT INTO school_users (id, school_code, email, name, role, password_hash)
          VALUES ($1, $2, $3, $4, $5, $6)
          ON CONFLICT (school_code, email) DO UPDATE SET
              name = EXCLUDED.name, role = EXCLUDED.role,
              password_hash = EXCLUDED.password_hash, updated_at = now()
          RETURNING id",
    )
    .bind(id)
    .bind(school_code)
    .bind(&email)
    .bind(&payload.name)
    .bind(&payload.role)
    .bind(&password_hash)
    .fetch_one(pool)
    .await?;

    Ok(SchoolUser {
        id: row.0,
        school_code: school_code.to_string(),
        email,
        name: payload.name,
        role: payload.role,
        password_hash,
    })
}

/// Look up a user by email within one school. `Ok(None)` when absent.
///
/// # Errors
///
/// Returns [`UserError::InvalidEmail`] for a malformed address, or a
/// database error if the query fails.
pub async fn find_user(
    pool: &PgPool,
    school_code: &str,
    email: &str,
) -> Result<Option<SchoolUser>, UserError> {
    let email = normalize_email(email).ok_or(UserError::InvalidEmail)?;

    let row = sqlx::query_as::<_, (Uuid, String, String, String)>(
        "SELECT id, name, role, password_hash
         FROM school_users
         WHERE school_code = $1 AND email = $2",
    )
    .bind(school_code)
    .bind(&email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, name, role, password_hash)| SchoolUser {
        id,
        school_code: school_code.to_string(),
        email,
        name,
        role,
        password_hash,
    }))
}

#[cfg(test)]
#[path = "user_test.rs"]
mod tests;
