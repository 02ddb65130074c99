pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// The signed-in coordinator, taken from a bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// Guard for the scheduled-job endpoints: `Authorization: Bearer {CRON_SECRET}`.
/// With no secret configured the endpoints are closed.
pub struct CronCaller;

#[async_trait]
impl FromRequestParts<AppState> for CronCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.cron_secret.as_deref() else {
            return Err(AppError::unauthorized());
        };

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        if !secret_matches(bearer.token(), secret) {
            return Err(AppError::unauthorized());
        }
        Ok(CronCaller)
    }
}

/// Compares digests so neither the contents nor the length of the secret
/// show up in timing.
fn secret_matches(presented: &str, secret: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(secret.as_bytes());
    presented.as_slice().ct_eq(expected.as_slice()).into()
}
