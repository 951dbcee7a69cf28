use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::store::ReportStore;
use crate::models::{AuthedUser, CollabError};

/// Claims carried by a handshake or API token
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    pub exp: usize,
}

// Get the auth token from request headers
pub fn get_auth_token(headers: &HeaderMap) -> Option<String> {
    // 1. Try the Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            return Some(
                auth_str
                    .strip_prefix("Bearer ")
                    .unwrap_or(auth_str)
                    .to_string(),
            );
        }
    }

    // 2. Fall back to the auth_token cookie
    let cookie_header = headers.get(http::header::COOKIE)?.to_str().ok()?;
    for cookie in cookie::Cookie::split_parse(cookie_header).flatten() {
        if cookie.name() == "auth_token" {
            return Some(cookie.value().to_string());
        }
    }
    None
}

// Validate a JWT token and return the claims
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<AuthClaims>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<AuthClaims>(token, &decoding_key, &validation)
}

/// Authenticate a websocket handshake credential.
///
/// Validates signature and expiry, then resolves the subject to an active
/// account through the store. A rejected handshake never reaches the presence
/// registry.
pub async fn authenticate_handshake(
    token: Option<String>,
    secret: Option<&str>,
    store: &Arc<dyn ReportStore>,
) -> Result<AuthedUser, CollabError> {
    let token = token.ok_or(CollabError::AuthenticationRequired)?;

    let Some(secret) = secret else {
        error!("Auth JWT secret not configured");
        return Err(CollabError::InvalidToken);
    };

    let token_data = validate_jwt(&token, secret).map_err(|e| {
        info!("JWT validation failed: {}", e);
        CollabError::InvalidToken
    })?;

    let uid = token_data.claims.sub;
    match store.load_active_user(&uid).await {
        Ok(Some(row)) => {
            info!("Handshake authenticated for user {}", row.id);
            Ok(AuthedUser {
                user_id: row.id,
                organization_id: row.org,
                display_name: row.display_name,
                role: row.role,
            })
        }
        Ok(None) => {
            info!("No active account for user {}", uid);
            Err(CollabError::UserNotFound)
        }
        Err(e) => {
            error!("Failed to load user {}: {}", uid, e);
            Err(CollabError::UserNotFound)
        }
    }
}
