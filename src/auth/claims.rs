/// JWT Claims structure
///
/// Payload signed into every access and refresh token. Both kinds share
/// one shape and differ only in the `refresh` flag and their lifetime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimal identity embedded in a token, enough to find the principal
/// again.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub email: String,
}

/// Which of the two token kinds to mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims for access and refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Embedded principal identity
    #[serde(rename = "user")]
    pub subject: Subject,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Unique token id, used for revocation
    pub jti: String,
    /// true for refresh tokens
    #[serde(rename = "refresh")]
    pub is_refresh: bool,
}

impl Claims {
    /// Create claims for `subject` expiring `expiry_seconds` after `now`.
    /// Every call gets a fresh `jti`.
    pub fn new(
        subject: Subject,
        kind: TokenKind,
        now: i64,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        Self {
            subject,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
            is_refresh: kind == TokenKind::Refresh,
        }
    }

    pub fn kind(&self) -> TokenKind {
        if self.is_refresh {
            TokenKind::Refresh
        } else {
            TokenKind::Access
        }
    }

    /// Expiry is inclusive: at `exp` itself the token is already dead.
    pub fn is_expired_at(&self, now: i64, leeway: i64) -> bool {
        now >= self.exp + leeway
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp(), 0)
    }
}
