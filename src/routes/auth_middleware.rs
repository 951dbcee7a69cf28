use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::error;

use crate::config;
use crate::models::ErrorResponse;
use crate::services::auth_service::{get_auth_token, validate_jwt};

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    let status = StatusCode::UNAUTHORIZED;
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: message.to_string(),
        }),
    )
}

/// Require a valid bearer token on the API routes above this layer.
pub async fn auth_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    // 1. Get the auth token from the request
    let Some(token) = get_auth_token(req.headers()) else {
        return Err(unauthorized("authentication required"));
    };

    // 2. Validate it against the configured secret
    let config = config::get_config();
    let Some(secret) = &config.auth_jwt_secret else {
        error!("Auth JWT secret not configured");
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        return Err((
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: "server misconfigured".to_string(),
            }),
        ));
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(unauthorized("invalid token"));
        }
    };

    // 3. Expose the caller's subject to downstream handlers
    req.extensions_mut().insert(token_data.claims.sub);

    Ok(next.run(req).await)
}
