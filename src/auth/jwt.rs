/// JWT Token Generation and Validation
///
/// `TokenCodec` signs and verifies the compact JWS tokens used for both
/// access and refresh tokens. Key material and algorithm are fixed when the
/// codec is built at startup; a bad configuration is rejected there and never
/// surfaces per request.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, Subject, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, ConfigError};

/// Why a token failed to decode. Only ever logged; callers see a single
/// "invalid token" outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidToken {
    Malformed(String),
    BadSignature,
    WrongIssuer,
    Expired,
}

impl fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidToken::Malformed(reason) => write!(f, "malformed token: {}", reason),
            InvalidToken::BadSignature => write!(f, "signature mismatch"),
            InvalidToken::WrongIssuer => write!(f, "unexpected issuer"),
            InvalidToken::Expired => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for InvalidToken {}

/// Signs and verifies tokens with a process-wide secret and algorithm
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
    leeway: i64,
}

impl TokenCodec {
    /// Build a codec from the JWT settings
    ///
    /// # Errors
    /// Returns a configuration error if the secret is empty, the algorithm
    /// is unknown or not an HMAC algorithm, or a lifetime is not positive.
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        if config.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }

        let algorithm = Algorithm::from_str(config.algorithm.trim()).map_err(|_| {
            ConfigError::InvalidValue(format!("unknown jwt.algorithm '{}'", config.algorithm))
        })?;

        // The secret is a shared key, so only the HMAC family makes sense.
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.algorithm '{}' is not an HMAC algorithm",
                config.algorithm
            )));
        }

        if config.access_token_expiry <= 0 || config.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be positive".to_string(),
            ));
        }

        if config.leeway < 0 {
            return Err(ConfigError::InvalidValue("jwt.leeway must not be negative".to_string()));
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
            leeway: config.leeway,
        })
    }

    pub fn access_token_expiry(&self) -> i64 {
        self.access_token_expiry
    }

    /// Serialize and sign claims
    ///
    /// # Errors
    /// Returns an internal error if signing fails
    pub fn encode(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Mint a new token of `kind` for `subject`, with a fresh token id and
    /// the lifetime configured for that kind.
    pub fn issue(&self, subject: &Subject, kind: TokenKind) -> Result<(String, Claims), AppError> {
        let lifetime = match kind {
            TokenKind::Access => self.access_token_expiry,
            TokenKind::Refresh => self.refresh_token_expiry,
        };
        let claims = Claims::new(
            subject.clone(),
            kind,
            chrono::Utc::now().timestamp(),
            lifetime,
            self.issuer.clone(),
        );
        let token = self.encode(&claims)?;
        Ok((token, claims))
    }

    /// Verify signature, issuer and expiry against the wall clock
    pub fn decode(&self, token: &str) -> Result<Claims, InvalidToken> {
        self.decode_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify a token as of `now` (Unix seconds)
    pub fn decode_at(&self, token: &str, now: i64) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is checked below so the boundary stays inclusive.
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => InvalidToken::BadSignature,
                ErrorKind::InvalidIssuer => InvalidToken::WrongIssuer,
                ErrorKind::ExpiredSignature => InvalidToken::Expired,
                _ => InvalidToken::Malformed(e.to_string()),
            })?;

        if claims.is_expired_at(now, self.leeway) {
            return Err(InvalidToken::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            issuer: "test".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            leeway: 0,
        }
    }

    fn subject() -> Subject {
        Subject {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
        }
    }

    #[test]
    fn test_round_trip() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();

        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let (token, claims) = codec.issue(&subject(), kind).expect("Failed to issue token");
            let decoded = codec.decode(&token).expect("Failed to decode token");
            assert_eq!(decoded, claims);
        }
    }

    #[test]
    fn test_lifetimes_follow_kind() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();

        let (_, access) = codec.issue(&subject(), TokenKind::Access).unwrap();
        let (_, refresh) = codec.issue(&subject(), TokenKind::Refresh).unwrap();

        assert_eq!(access.exp - access.iat, 3600);
        assert_eq!(refresh.exp - refresh.iat, 604800);
        assert!(!access.is_refresh);
        assert!(refresh.is_refresh);
    }

    #[test]
    fn test_expiry_equal_to_now_is_rejected() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let (token, claims) = codec.issue(&subject(), TokenKind::Access).unwrap();

        assert!(codec.decode_at(&token, claims.exp - 1).is_ok());
        assert_eq!(codec.decode_at(&token, claims.exp), Err(InvalidToken::Expired));
        assert_eq!(codec.decode_at(&token, claims.exp + 10), Err(InvalidToken::Expired));
    }

    #[test]
    fn test_leeway_extends_validity() {
        let mut config = get_test_config();
        config.leeway = 5;
        let codec = TokenCodec::new(&config).unwrap();
        let (token, claims) = codec.issue(&subject(), TokenKind::Access).unwrap();

        assert!(codec.decode_at(&token, claims.exp + 4).is_ok());
        assert_eq!(codec.decode_at(&token, claims.exp + 5), Err(InvalidToken::Expired));
    }

    #[test]
    fn test_already_expired_token() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims::new(subject(), TokenKind::Access, now - 120, 60, "test".to_string());
        let token = codec.encode(&claims).unwrap();

        assert_eq!(codec.decode(&token), Err(InvalidToken::Expired));
    }

    #[test]
    fn test_invalid_token() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let result = codec.decode("invalid.token.here");

        assert!(matches!(result, Err(InvalidToken::Malformed(_))));
    }

    #[test]
    fn test_tampered_token() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let (token, _) = codec.issue(&subject(), TokenKind::Access).unwrap();

        // Swap one character in the middle of the signature
        let at = token.rfind('.').unwrap() + 5;
        let replacement = if &token[at..at + 1] == "A" { "B" } else { "A" };
        let tampered = format!("{}{}{}", &token[..at], replacement, &token[at + 1..]);

        assert!(codec.decode(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let (token, _) = codec.issue(&subject(), TokenKind::Access).unwrap();

        let mut other = get_test_config();
        other.secret = "another-secret-key-at-least-32-characters".to_string();
        let other = TokenCodec::new(&other).unwrap();

        assert_eq!(other.decode(&token), Err(InvalidToken::BadSignature));
    }

    #[test]
    fn test_wrong_issuer() {
        let codec = TokenCodec::new(&get_test_config()).unwrap();
        let (token, _) = codec.issue(&subject(), TokenKind::Access).unwrap();

        let mut config = get_test_config();
        config.issuer = "wrong-issuer".to_string();
        let other = TokenCodec::new(&config).unwrap();

        assert_eq!(other.decode(&token), Err(InvalidToken::WrongIssuer));
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let mut config = get_test_config();
        config.secret = "  ".to_string();

        assert!(matches!(
            TokenCodec::new(&config),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_unsupported_algorithm_is_config_error() {
        for algorithm in ["NOPE", "RS256", ""] {
            let mut config = get_test_config();
            config.algorithm = algorithm.to_string();
            assert!(
                matches!(TokenCodec::new(&config), Err(ConfigError::InvalidValue(_))),
                "algorithm {:?} should be rejected",
                algorithm
            );
        }
    }

    #[test]
    fn test_hs512() {
        let mut config = get_test_config();
        config.algorithm = "HS512".to_string();
        let codec = TokenCodec::new(&config).unwrap();
        let (token, claims) = codec.issue(&subject(), TokenKind::Refresh).unwrap();

        assert_eq!(codec.decode(&token).unwrap(), claims);
    }
}
