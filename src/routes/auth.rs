/// Authentication Routes
///
/// Signup, login, token refresh, logout and current-user lookup.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{Claims, CredentialHasher, TokenAuthenticator};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::principals::{NewPrincipal, Principal, PrincipalStore, Role};
use crate::validators::{is_valid_email, is_valid_name, is_valid_password};

/// User signup request
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginUser {
    pub email: String,
    pub uid: String,
}

/// Login response with access and refresh tokens
#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: LoginUser,
}

/// Refresh response with a new access token
#[derive(Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

fn optional_name(field: &str, value: &Option<String>) -> Result<Option<String>, AppError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => Ok(Some(is_valid_name(field, value)?)),
    }
}

/// POST /api/v1/auth/signup
///
/// Create an account with role `user`. The role is never taken from
/// the request body.
///
/// # Errors
/// - 400: Validation errors
/// - 409: Email already registered
pub async fn signup(
    form: web::Json<SignupRequest>,
    principals: web::Data<dyn PrincipalStore>,
    hasher: web::Data<CredentialHasher>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_signup");
    let form = form.into_inner();

    let email = is_valid_email(&form.email)?;
    let username = is_valid_name("username", &form.username)?;
    let first_name = optional_name("first_name", &form.first_name)?;
    let last_name = optional_name("last_name", &form.last_name)?;
    is_valid_password(&form.password)?;

    if principals.find_by_email(&email).await?.is_some() {
        return Err(context.log_error(AuthError::UserAlreadyExists.into()));
    }

    let password_hash = hasher.hash_blocking(form.password).await?;

    let principal = principals
        .create(NewPrincipal {
            username,
            email,
            first_name,
            last_name,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| context.log_error(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %principal.id,
        "User signed up successfully"
    );

    Ok(HttpResponse::Created().json(principal))
}

/// POST /api/v1/auth/login
///
/// Emails are matched case-insensitively.
///
/// # Errors
/// - 401: Invalid credentials. Unknown email and wrong password produce
///   the same response after the same bcrypt work.
pub async fn login(
    form: web::Json<LoginRequest>,
    principals: web::Data<dyn PrincipalStore>,
    hasher: web::Data<CredentialHasher>,
    authenticator: web::Data<TokenAuthenticator>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let form = form.into_inner();

    let email = form.email.trim().to_lowercase();

    let principal = match principals.find_by_email(&email).await? {
        Some(principal) => principal,
        None => {
            // Pay the same bcrypt cost as a wrong password
            hasher.verify_absent_blocking(form.password).await?;
            return Err(context.log_error(AuthError::InvalidCredentials.into()));
        }
    };

    let context = context.with_user_id(principal.id.to_string());

    let password_valid = hasher
        .verify_blocking(form.password, principal.password_hash.clone())
        .await?;
    if !password_valid {
        return Err(context.log_error(AuthError::InvalidCredentials.into()));
    }

    let pair = authenticator.issue_token_pair(&principal)?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %principal.id,
        token_id = %pair.access_claims.jti,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Login successful".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: authenticator.codec().access_token_expiry(),
        user: LoginUser {
            email: principal.email,
            uid: principal.id.to_string(),
        },
    }))
}

/// GET /api/v1/auth/refresh_token
///
/// **Requires a refresh token**. Issues a new access token for the same
/// subject; the refresh token is not rotated.
pub async fn refresh(
    claims: web::ReqData<Claims>,
    authenticator: web::Data<TokenAuthenticator>,
) -> Result<HttpResponse, AppError> {
    let claims = claims.into_inner();
    let (access_token, access_claims) = authenticator.refresh(&claims)?;

    tracing::info!(
        user_id = %claims.subject.id,
        token_id = %access_claims.jti,
        "Access token refreshed"
    );

    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: authenticator.codec().access_token_expiry(),
    }))
}

/// GET /api/v1/auth/logout
///
/// **Requires an access token**. Revokes only that token.
pub async fn logout(
    claims: web::ReqData<Claims>,
    authenticator: web::Data<TokenAuthenticator>,
) -> Result<HttpResponse, AppError> {
    authenticator.logout(&claims.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// GET /api/v1/auth/me
///
/// **Requires an access token and role `user` or `admin`**. The principal
/// is loaded and checked by the role middleware.
pub async fn get_current_user(principal: web::ReqData<Principal>) -> HttpResponse {
    HttpResponse::Ok().json(principal.into_inner())
}
