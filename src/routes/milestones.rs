use axum::extract::{Json, Path, State};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::milestones::{self, display_status, MilestoneStatus, MilestoneUpdate};
use crate::models::Milestone;
use crate::schema::{milestones as milestones_table, transactions};
use crate::state::AppState;
use crate::transactions as transaction_store;

#[derive(Serialize)]
pub struct MilestoneResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub milestone_type: String,
    pub due_date: NaiveDate,
    pub status: String,
    /// `overdue` for a pending milestone past its due date, otherwise `status`.
    pub display_status: String,
    pub notes: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

pub fn to_milestone_response(milestone: Milestone, today: NaiveDate) -> MilestoneResponse {
    let shown = match milestone.status.parse::<MilestoneStatus>() {
        Ok(stored) => display_status(stored, milestone.due_date, today)
            .as_str()
            .to_string(),
        Err(_) => milestone.status.clone(),
    };
    MilestoneResponse {
        id: milestone.id,
        transaction_id: milestone.transaction_id,
        name: milestone.name,
        milestone_type: milestone.milestone_type,
        due_date: milestone.due_date,
        status: milestone.status,
        display_status: shown,
        notes: milestone.notes,
        completed_at: milestone.completed_at,
        updated_at: milestone.updated_at,
    }
}

pub fn to_milestone_responses(rows: Vec<Milestone>) -> Vec<MilestoneResponse> {
    let today = Utc::now().date_naive();
    rows.into_iter()
        .map(|row| to_milestone_response(row, today))
        .collect()
}

pub async fn list_milestones(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<Vec<MilestoneResponse>>> {
    let mut conn = state.db()?;
    transaction_store::find_owned(&mut conn, user.user_id, transaction_id)?;
    let rows = milestones::list_for_transaction(&mut conn, transaction_id)?;
    Ok(Json(to_milestone_responses(rows)))
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
pub struct UpdateMilestoneRequest {
    pub status: Option<String>,
    /// Absent leaves notes alone; `null` clears them.
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
}

pub async fn update_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(milestone_id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateMilestoneRequest>,
) -> AppResult<Json<MilestoneResponse>> {
    let status = payload
        .status
        .as_deref()
        .map(|value| value.trim().to_lowercase().parse::<MilestoneStatus>())
        .transpose()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    if status.is_none() && payload.notes.is_none() {
        return Err(AppError::bad_request("nothing to update"));
    }

    let mut conn = state.db()?;
    let owned = milestones_table::table
        .inner_join(transactions::table)
        .filter(milestones_table::id.eq(milestone_id))
        .filter(transactions::user_id.eq(user.user_id))
        .select(milestones_table::id)
        .first::<Uuid>(&mut conn)
        .optional()?;
    if owned.is_none() {
        return Err(AppError::not_found_with("milestone not found"));
    }

    let notes = payload
        .notes
        .map(|notes| notes.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()));
    let updated = milestones::apply_update(&mut conn, milestone_id, MilestoneUpdate { status, notes })?;
    Ok(Json(to_milestone_response(updated, Utc::now().date_naive())))
}
