/// Principal (user account) persistence
///
/// The auth core only reads principals: email for login, id for
/// re-identifying a token's subject, role for the authorization gate.
/// Signup is the single write path.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError, DatabaseError};

/// Coarse permission label, from a closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A stored user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a principal at signup
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError>;

    /// Insert a principal
    ///
    /// # Errors
    /// `AuthError::UserAlreadyExists` if the email is taken
    async fn create(&self, new: NewPrincipal) -> Result<Principal, AppError>;
}

/// Postgres store over the `user_accounts` table (see `migrations/`)
#[derive(Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    uid: Uuid,
    username: String,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    role: String,
    is_verified: bool,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = AppError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::Database(DatabaseError::UnexpectedError(e)))?;

        Ok(Principal {
            id: row.uid,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            is_verified: row.is_verified,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

const PRINCIPAL_COLUMNS: &str =
    "uid, username, email, first_name, last_name, role, is_verified, password_hash, created_at";

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {} FROM user_accounts WHERE lower(email) = lower($1)",
            PRINCIPAL_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {} FROM user_accounts WHERE uid = $1",
            PRINCIPAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn create(&self, new: NewPrincipal) -> Result<Principal, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            r#"
            INSERT INTO user_accounts
                (uid, username, email, first_name, last_name, role, is_verified, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, false, $7, $8)
            RETURNING {}
            "#,
            PRINCIPAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role.as_str())
        .bind(&new.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                AppError::Auth(AuthError::UserAlreadyExists)
            }
            other => other,
        })?;

        Principal::try_from(row)
    }
}

/// Principals held in process memory
#[derive(Debug, Default)]
pub struct InMemoryPrincipalStore {
    principals: Mutex<HashMap<Uuid, Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed principal, bypassing signup (seeding, tests)
    pub fn insert(&self, principal: Principal) {
        if let Ok(mut principals) = self.principals.lock() {
            principals.insert(principal.id, principal);
        }
    }
}

/// Mirrors the `lower(email)` unique index
fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn poisoned() -> AppError {
    AppError::Internal("principal store lock poisoned".to_string())
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let principals = self.principals.lock().map_err(|_| poisoned())?;
        Ok(principals.values().find(|p| same_email(&p.email, email)).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError> {
        let principals = self.principals.lock().map_err(|_| poisoned())?;
        Ok(principals.get(&id).cloned())
    }

    async fn create(&self, new: NewPrincipal) -> Result<Principal, AppError> {
        let mut principals = self.principals.lock().map_err(|_| poisoned())?;

        if principals.values().any(|p| same_email(&p.email, &new.email)) {
            return Err(AppError::Auth(AuthError::UserAlreadyExists));
        }

        let principal = Principal {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role: new.role,
            is_verified: false,
            password_hash: new.password_hash,
            created_at: Utc::now(),
        };
        principals.insert(principal.id, principal.clone());
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_principal(email: &str) -> NewPrincipal {
        NewPrincipal {
            username: "reader".to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            password_hash: "$2b$04$hash".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("Admin".parse::<Role>().is_err());
        assert!("superuser".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_password_hash_is_never_serialized() {
        let principal = Principal {
            id: Uuid::new_v4(),
            username: "reader".to_string(),
            email: "a@x.com".to_string(),
            first_name: None,
            last_name: None,
            role: Role::User,
            is_verified: false,
            password_hash: "$2b$04$hash".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&principal).unwrap();

        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryPrincipalStore::new();
        let created = store.create(new_principal("a@x.com")).await.unwrap();

        let by_email = store.find_by_email("a@x.com").await.unwrap();
        let by_id = store.find_by_id(created.id).await.unwrap();

        assert_eq!(by_email, Some(created.clone()));
        assert_eq!(by_id, Some(created));
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = InMemoryPrincipalStore::new();
        store.create(new_principal("a@x.com")).await.unwrap();

        let result = store.create(new_principal("a@x.com")).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UserAlreadyExists))
        ));
    }

    #[tokio::test]
    async fn test_email_lookup_ignores_case() {
        let store = InMemoryPrincipalStore::new();
        let created = store.create(new_principal("a@x.com")).await.unwrap();

        assert_eq!(store.find_by_email("A@X.com").await.unwrap(), Some(created));

        let result = store.create(new_principal("A@x.COM")).await;
        assert!(matches!(
            result,
            Err(AppError::Auth(AuthError::UserAlreadyExists))
        ));
    }
}
