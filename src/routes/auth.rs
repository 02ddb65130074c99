use axum::{extract::State, http::StatusCode, Json};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    extract::AppJson,
    models::{NewUser, User},
    schema::users,
    state::AppState,
};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

fn token_response(state: &AppState, user: User) -> AppResult<TokenResponse> {
    let access_token = state.jwt.issue(user.id, &user.email)?;
    Ok(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_seconds(),
        user: user.into(),
    })
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let email = normalize_email(&payload.email);
    let name = payload.name.trim().to_string();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AppError::bad_request("a valid email address is required"));
    }
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if payload.password.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let mut conn = state.db()?;
    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
        })
        .get_result(&mut conn)
        .map_err(|err| match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AppError::conflict("an account with this email already exists")
            }
            other => AppError::from(other),
        })?;

    info!(user_id = %user.id, "registered user");
    Ok((StatusCode::CREATED, Json(token_response(&state, user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::email.eq(normalize_email(&payload.email)))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    Ok(Json(token_response(&state, user)?))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let record: User = users::table
        .find(user.user_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;
    Ok(Json(record.into()))
}
