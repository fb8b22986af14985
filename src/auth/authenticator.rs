/// Token Authenticator
///
/// Every protected request runs the same checks, in order:
///
/// 1. a bearer token is present
/// 2. it decodes (signature, issuer, expiry)
/// 3. its `jti` is not on the blocklist
/// 4. its kind matches what the endpoint requires
///
/// Steps 2 and 3 fail the same way so callers cannot tell a revoked token
/// from a forged one. Login, refresh and logout are built on top.

use std::sync::Arc;

use crate::auth::claims::{Claims, Subject, TokenKind};
use crate::auth::jwt::TokenCodec;
use crate::auth::revocation::RevocationStore;
use crate::error::{AppError, AuthError};
use crate::principals::Principal;

/// Which token kind an endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredMode {
    /// Ordinary protected endpoints
    Access,
    /// The refresh endpoint only
    Refresh,
}

/// Tokens handed out at login
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_claims: Claims,
    pub refresh_claims: Claims,
}

/// Extract the token from an `Authorization` header value
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

#[derive(Clone)]
pub struct TokenAuthenticator {
    codec: TokenCodec,
    store: Arc<dyn RevocationStore>,
}

impl TokenAuthenticator {
    pub fn new(codec: TokenCodec, store: Arc<dyn RevocationStore>) -> Self {
        Self { codec, store }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Validate an inbound token for an endpoint requiring `mode`
    ///
    /// # Errors
    /// - `AuthError::MissingCredentials` when no token was sent
    /// - `AuthError::InvalidToken` when it fails to decode or is revoked
    /// - `AuthError::AccessTokenRequired` / `RefreshTokenRequired` on a kind mismatch
    /// - a cache error when the blocklist cannot be reached
    pub async fn authenticate(
        &self,
        token: Option<&str>,
        mode: RequiredMode,
    ) -> Result<Claims, AppError> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::MissingCredentials.into()),
        };

        let claims = self.codec.decode(token).map_err(|reason| {
            tracing::info!(reason = %reason, "Token rejected");
            AuthError::InvalidToken
        })?;

        if self.store.is_revoked(&claims.jti).await? {
            tracing::warn!(
                token_id = %claims.jti,
                user_id = %claims.subject.id,
                "Revoked token presented"
            );
            return Err(AuthError::InvalidToken.into());
        }

        match (mode, claims.kind()) {
            (RequiredMode::Access, TokenKind::Refresh) => {
                return Err(AuthError::AccessTokenRequired.into())
            }
            (RequiredMode::Refresh, TokenKind::Access) => {
                return Err(AuthError::RefreshTokenRequired.into())
            }
            _ => {}
        }

        tracing::debug!(
            token_id = %claims.jti,
            user_id = %claims.subject.id,
            "Token authenticated"
        );
        Ok(claims)
    }

    /// Issue an access token and a refresh token for a principal who has
    /// just proven their credentials
    pub fn issue_token_pair(&self, principal: &Principal) -> Result<TokenPair, AppError> {
        let subject = Subject {
            id: principal.id,
            email: principal.email.clone(),
        };

        let (access_token, access_claims) = self.codec.issue(&subject, TokenKind::Access)?;
        let (refresh_token, refresh_claims) = self.codec.issue(&subject, TokenKind::Refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_claims,
            refresh_claims,
        })
    }

    /// Mint a new access token from an authenticated refresh token
    ///
    /// The refresh token itself stays valid until it expires or is revoked.
    pub fn refresh(&self, refresh_claims: &Claims) -> Result<(String, Claims), AppError> {
        if !refresh_claims.is_refresh {
            return Err(AuthError::RefreshTokenRequired.into());
        }
        if refresh_claims.is_expired() {
            return Err(AuthError::InvalidToken.into());
        }

        self.codec.issue(&refresh_claims.subject, TokenKind::Access)
    }

    /// Revoke the token the caller authenticated with. Sibling tokens from
    /// the same login are left alone.
    pub async fn logout(&self, claims: &Claims) -> Result<(), AppError> {
        self.store.revoke(&claims.jti).await?;
        tracing::info!(
            token_id = %claims.jti,
            user_id = %claims.subject.id,
            "Token revoked"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::get_test_config;
    use crate::auth::password::CredentialHasher;
    use crate::auth::revocation::InMemoryRevocationStore;
    use crate::principals::Role;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn authenticator() -> TokenAuthenticator {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let store = Arc::new(InMemoryRevocationStore::new(Duration::from_secs(3600)));
        TokenAuthenticator::new(codec, store)
    }

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: "a".to_string(),
            email: "a@x.com".to_string(),
            first_name: None,
            last_name: None,
            role: Role::User,
            is_verified: false,
            password_hash: CredentialHasher::new(4).unwrap().hash("secret123").unwrap(),
            created_at: Utc::now(),
        }
    }

    fn auth_error(result: Result<Claims, AppError>) -> AuthError {
        match result {
            Err(AppError::Auth(e)) => e,
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(parse_bearer("abc.def.ghi"), None);
    }

    #[tokio::test]
    async fn test_login_issues_both_kinds() {
        let auth = authenticator();
        let principal = principal();
        assert!(CredentialHasher::new(4).unwrap().verify("secret123", &principal.password_hash));

        let pair = auth.issue_token_pair(&principal).unwrap();

        assert!(!pair.access_claims.is_refresh);
        assert!(pair.refresh_claims.is_refresh);
        assert_eq!(pair.access_claims.subject.email, "a@x.com");
        assert_eq!(pair.refresh_claims.subject.email, "a@x.com");
        assert_ne!(pair.access_claims.jti, pair.refresh_claims.jti);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let auth = authenticator();

        assert_eq!(
            auth_error(auth.authenticate(None, RequiredMode::Access).await),
            AuthError::MissingCredentials
        );
        assert_eq!(
            auth_error(auth.authenticate(Some("  "), RequiredMode::Access).await),
            AuthError::MissingCredentials
        );
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let auth = authenticator();
        assert_eq!(
            auth_error(auth.authenticate(Some("not.a.jwt"), RequiredMode::Access).await),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected_both_ways() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        assert_eq!(
            auth_error(
                auth.authenticate(Some(pair.refresh_token.as_str()), RequiredMode::Access)
                    .await
            ),
            AuthError::AccessTokenRequired
        );
        assert_eq!(
            auth_error(
                auth.authenticate(Some(pair.access_token.as_str()), RequiredMode::Refresh)
                    .await
            ),
            AuthError::RefreshTokenRequired
        );
    }

    #[tokio::test]
    async fn test_matching_kind_is_accepted() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        let access = auth
            .authenticate(Some(pair.access_token.as_str()), RequiredMode::Access)
            .await
            .unwrap();
        let refresh = auth
            .authenticate(Some(pair.refresh_token.as_str()), RequiredMode::Refresh)
            .await
            .unwrap();

        assert_eq!(access, pair.access_claims);
        assert_eq!(refresh, pair.refresh_claims);
    }

    #[tokio::test]
    async fn test_revoked_token_is_invalid_although_it_decodes() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        auth.logout(&pair.access_claims).await.unwrap();

        assert!(auth.codec().decode(&pair.access_token).is_ok());
        assert_eq!(
            auth_error(
                auth.authenticate(Some(pair.access_token.as_str()), RequiredMode::Access)
                    .await
            ),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn test_logout_does_not_cascade_to_refresh_token() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        auth.logout(&pair.access_claims).await.unwrap();

        assert!(auth
            .authenticate(Some(pair.refresh_token.as_str()), RequiredMode::Refresh)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refresh_keeps_subject_and_refresh_token() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        let claims = auth
            .authenticate(Some(pair.refresh_token.as_str()), RequiredMode::Refresh)
            .await
            .unwrap();
        let (new_access, new_claims) = auth.refresh(&claims).unwrap();

        assert_eq!(new_claims.subject, pair.refresh_claims.subject);
        assert!(!new_claims.is_refresh);
        assert_ne!(new_claims.jti, pair.access_claims.jti);
        assert!(auth
            .authenticate(Some(new_access.as_str()), RequiredMode::Access)
            .await
            .is_ok());
        assert!(auth
            .authenticate(Some(pair.refresh_token.as_str()), RequiredMode::Refresh)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_claims() {
        let auth = authenticator();
        let pair = auth.issue_token_pair(&principal()).unwrap();

        assert!(matches!(
            auth.refresh(&pair.access_claims),
            Err(AppError::Auth(AuthError::RefreshTokenRequired))
        ));
    }
}
