use axum::extract::{Json, State};

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::extract::AppJson;
use crate::notifications::preferences::{self, Preferences, PreferencesPatch};
use crate::state::AppState;

pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Preferences>> {
    let mut conn = state.db()?;
    let prefs = preferences::load(&mut conn, user.user_id, state.config.reminder_default_lead_days)?;
    Ok(Json(prefs))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(patch): AppJson<PreferencesPatch>,
) -> AppResult<Json<Preferences>> {
    let mut conn = state.db()?;
    let current = preferences::load(&mut conn, user.user_id, state.config.reminder_default_lead_days)?;
    let next = patch.apply(current)?;
    let saved = preferences::save(&mut conn, user.user_id, next)?;
    Ok(Json(saved))
}
