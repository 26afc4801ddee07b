use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Claims of the bearer token the bot front-end presents; `sub` is the
/// Telegram user id the call is made on behalf of.
#[derive(Debug, Serialize, Deserialize)]
pub struct BotClaims {
    pub sub: String,
    pub exp: usize,
}

/// HS256 secret shared with the bot front-end. Installed on the API routers
/// as a request extension.
#[derive(Clone)]
pub struct BotApiKey(Arc<DecodingKey>);

impl BotApiKey {
    pub fn new(secret: &str) -> Self {
        Self(Arc::new(DecodingKey::from_secret(secret.as_bytes())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotUser {
    pub telegram_id: i64,
}

#[derive(Debug)]
pub struct AuthError(anyhow::Error);

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError(err)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate_bot_jwt(token: &str, key: &BotApiKey) -> Result<BotClaims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);

    let token_data = decode::<BotClaims>(token, &key.0, &validation)
        .map_err(|e| anyhow::anyhow!("JWT validation failed: {}", e))?;

    Ok(token_data.claims)
}

fn unauthorized(message: &str) -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, message.to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for BotUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts.extensions.get::<BotApiKey>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication is not configured".to_string(),
        ))?;

        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| unauthorized("Invalid Authorization header"))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Invalid Authorization header format"))?;

        let claims = validate_bot_jwt(token, &key)
            .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

        let telegram_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| unauthorized("Invalid telegram id in token"))?;

        Ok(BotUser { telegram_id })
    }
}

#[cfg(test)]
mod tests;
