//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for account registration and token issuance,
//! plus the JWT helpers used by the middleware.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use promptdeck_core::domain::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// JWT Helpers
//=========================================================================================

/// The claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// Issues a signed HS256 access token for the given user.
pub fn create_access_token(
    secret: &str,
    user_id: Uuid,
    ttl_minutes: i64,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        exp: (now + chrono::Duration::minutes(ttl_minutes)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to sign access token: {e}")))
}

/// Decodes and validates an access token, returning the user id it names.
pub fn decode_access_token(secret: &str, token: &str) -> Result<Uuid, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Could not validate credentials".to_string()))?;
    Ok(data.claims.sub)
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_active: user.is_active,
            is_premium: user.is_premium,
            created_at: user.created_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Port(
            promptdeck_core::ports::PortError::Validation("A valid email is required".to_string()),
        ));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Port(
            promptdeck_core::ports::PortError::Validation(
                "Password must be at least 8 characters".to_string(),
            ),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    let user = state
        .db
        .create_user(&email, &password_hash, req.full_name.as_deref())
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /auth/token - Exchange credentials for an access token
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn token_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    // A missing account and a wrong password produce the same response.
    let creds = state.db.get_user_by_email(&email).await.map_err(|_| {
        ApiError::Unauthorized("Incorrect email or password".to_string())
    })?;

    let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(ApiError::Unauthorized(
            "Incorrect email or password".to_string(),
        ));
    }
    if !creds.is_active {
        return Err(ApiError::Unauthorized("Inactive user".to_string()));
    }

    let access_token = create_access_token(
        &state.config.jwt_secret,
        creds.id,
        state.config.jwt_ttl_minutes,
    )?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// GET /users/me - Return the authenticated user's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "The current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.get_user_by_id(user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = create_access_token("test-secret", user_id, 30).unwrap();
        let decoded = decode_access_token("test-secret", &token).unwrap();
        assert_eq!(decoded, user_id);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_access_token("secret-a", Uuid::new_v4(), 30).unwrap();
        assert!(decode_access_token("secret-b", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = create_access_token("test-secret", Uuid::new_v4(), -60).unwrap();
        assert!(decode_access_token("test-secret", &token).is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(decode_access_token("test-secret", "not-a-jwt").is_err());
    }
}
