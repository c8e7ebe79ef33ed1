//! Authentication middleware and JWT issuing/verification

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::app::AppState;
use crate::store::User;
use crate::util::time::unix_secs;

type HmacSha256 = Hmac<Sha256>;

/// Fixed JOSE header of every issued token
const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// JWT claims of a player token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name at issue time
    #[serde(default)]
    pub name: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

fn sign(message: &str, secret: &str) -> Result<HmacSha256, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(message.as_bytes());
    Ok(mac)
}

/// Issue an HS256 token for `user`
pub fn issue_jwt(user: &User, secret: &str, ttl: Duration) -> Result<String, AuthError> {
    let iat = unix_secs();
    let claims = JwtClaims {
        sub: user.id.clone(),
        name: user.name.clone(),
        exp: iat + ttl.as_secs(),
        iat,
    };
    let payload = serde_json::to_vec(&claims).map_err(|_| AuthError::InvalidToken)?;

    let message = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(JWT_HEADER),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = sign(&message, secret)?.finalize().into_bytes();

    Ok(format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify a JWT token and extract claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    // Split token into parts
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    // Verify signature (HMAC-SHA256)
    let message = format!("{}.{}", header_b64, payload_b64);
    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    sign(&message, secret)?
        .verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    // Decode payload
    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    // Check expiration
    if claims.exp < unix_secs() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract JWT from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Unknown user")]
    UnknownUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::MissingHeader
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::UnknownUser => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({
            "type": "error",
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

/// Authenticated user extractor result
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub claims: JwtClaims,
}

/// Verify a token and resolve its subject through the user directory
pub fn authenticate(state: &AppState, token: &str) -> Result<AuthenticatedUser, AuthError> {
    let claims = verify_jwt(token, &state.config.jwt_secret)?;
    let user = state
        .users
        .resolve(&claims.sub)
        .map_err(|_| AuthError::UnknownUser)?;
    Ok(AuthenticatedUser { user, claims })
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    let token = extract_bearer_token(auth_header).ok_or(AuthError::InvalidFormat)?;

    let auth_user = authenticate(&state, token)?;

    // Insert into request extensions for handlers to access
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
