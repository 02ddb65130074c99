//! Endpoints for an external scheduler. Both run synchronously and return the
//! delivery report.

use axum::extract::{Json, State};
use chrono::Utc;
use tracing::info;

use crate::auth::CronCaller;
use crate::error::AppResult;
use crate::notifications::reminders::{self, RunReport};
use crate::state::AppState;

pub async fn run_reminders(
    State(state): State<AppState>,
    _caller: CronCaller,
) -> AppResult<Json<RunReport>> {
    let today = Utc::now().date_naive();
    info!(run_date = %today, "cron: daily reminder scan requested");
    let report = reminders::run_daily_scan(
        &state.pool,
        state.mailer.as_ref(),
        today,
        state.config.reminder_default_lead_days,
    )
    .await?;
    Ok(Json(report))
}

pub async fn run_weekly_digest(
    State(state): State<AppState>,
    _caller: CronCaller,
) -> AppResult<Json<RunReport>> {
    let today = Utc::now().date_naive();
    info!(run_date = %today, "cron: weekly digest requested");
    let report = reminders::run_weekly_digest(&state.pool, state.mailer.as_ref(), today).await?;
    Ok(Json(report))
}
