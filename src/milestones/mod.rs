use std::fmt;

use chrono::{NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::error::AppError;
use crate::models::{Milestone, NewMilestone};
use crate::schema::{milestones, transactions};
use crate::transactions::TransactionStatus;

pub mod schedule;
pub mod status;

pub use schedule::{plan_milestones, ContractFacts, FinancingType, PlannedMilestone, ScheduleError};
pub use status::{display_status, MilestoneStatus, TransitionError, OUTSTANDING_STATUSES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Deposit,
    Inspection,
    AttorneyReview,
    Appraisal,
    LoanApproval,
    Title,
    Closing,
    Other,
}

impl MilestoneKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneKind::Deposit => "deposit",
            MilestoneKind::Inspection => "inspection",
            MilestoneKind::AttorneyReview => "attorney_review",
            MilestoneKind::Appraisal => "appraisal",
            MilestoneKind::LoanApproval => "loan_approval",
            MilestoneKind::Title => "title",
            MilestoneKind::Closing => "closing",
            MilestoneKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deposit" => Some(MilestoneKind::Deposit),
            "inspection" => Some(MilestoneKind::Inspection),
            "attorney_review" => Some(MilestoneKind::AttorneyReview),
            "appraisal" => Some(MilestoneKind::Appraisal),
            "loan_approval" => Some(MilestoneKind::LoanApproval),
            "title" => Some(MilestoneKind::Title),
            "closing" => Some(MilestoneKind::Closing),
            "other" => Some(MilestoneKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for MilestoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MilestoneError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("milestone has an unrecognised stored status '{0}'")]
    CorruptStatus(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<MilestoneError> for AppError {
    fn from(value: MilestoneError) -> Self {
        match value {
            MilestoneError::Transition(err) => AppError::bad_request(err.to_string()),
            MilestoneError::Database(err) => AppError::from(err),
            other => AppError::internal(other),
        }
    }
}

impl From<ScheduleError> for AppError {
    fn from(value: ScheduleError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

/// Partial update of a milestone. `notes: Some(None)` clears the notes.
#[derive(Debug, Default)]
pub struct MilestoneUpdate {
    pub status: Option<MilestoneStatus>,
    pub notes: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = milestones)]
struct MilestoneChangeset {
    status: Option<String>,
    notes: Option<Option<String>>,
    completed_at: Option<Option<chrono::NaiveDateTime>>,
    updated_at: chrono::NaiveDateTime,
}

pub fn stored_status(milestone: &Milestone) -> Result<MilestoneStatus, MilestoneError> {
    milestone
        .status
        .parse()
        .map_err(|_| MilestoneError::CorruptStatus(milestone.status.clone()))
}

/// Persists a plan for a transaction. When `completed_before` is set, every
/// milestone due before that date is stored as already completed.
pub fn insert_plan(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    plan: &[PlannedMilestone],
    completed_before: Option<NaiveDate>,
) -> QueryResult<Vec<Milestone>> {
    let now = Utc::now().naive_utc();
    let rows: Vec<NewMilestone> = plan
        .iter()
        .enumerate()
        .map(|(position, planned)| {
            let elapsed = completed_before.is_some_and(|cutoff| planned.due_date < cutoff);
            NewMilestone {
                id: Uuid::new_v4(),
                transaction_id,
                name: planned.name.to_string(),
                milestone_type: planned.kind.as_str().to_string(),
                due_date: planned.due_date,
                status: if elapsed {
                    MilestoneStatus::Completed.as_str().to_string()
                } else {
                    MilestoneStatus::Pending.as_str().to_string()
                },
                position: position as i32,
                completed_at: elapsed.then_some(now),
            }
        })
        .collect();

    diesel::insert_into(milestones::table)
        .values(&rows)
        .execute(conn)?;

    info!(
        transaction_id = %transaction_id,
        count = rows.len(),
        "generated milestone timeline"
    );

    list_for_transaction(conn, transaction_id)
}

pub fn list_for_transaction(
    conn: &mut PgConnection,
    transaction_id: Uuid,
) -> QueryResult<Vec<Milestone>> {
    milestones::table
        .filter(milestones::transaction_id.eq(transaction_id))
        .order((milestones::due_date.asc(), milestones::position.asc()))
        .load(conn)
}

/// Applies a validated update and rolls the outcome up into the parent
/// transaction's status. Runs inside one database transaction.
pub fn apply_update(
    conn: &mut PgConnection,
    milestone_id: Uuid,
    update: MilestoneUpdate,
) -> Result<Milestone, MilestoneError> {
    conn.transaction(|conn| {
        let current: Milestone = milestones::table
            .find(milestone_id)
            .for_update()
            .first(conn)?;
        let from = stored_status(&current)?;

        let now = Utc::now().naive_utc();
        let mut changeset = MilestoneChangeset {
            status: None,
            notes: update.notes,
            completed_at: None,
            updated_at: now,
        };

        let target = match update.status {
            Some(target) => {
                let next = from.transition(target)?;
                if next != from {
                    changeset.status = Some(next.as_str().to_string());
                    if next == MilestoneStatus::Completed {
                        changeset.completed_at = Some(Some(now));
                    }
                }
                Some(next)
            }
            None => None,
        };

        diesel::update(milestones::table.find(milestone_id))
            .set(&changeset)
            .execute(conn)?;

        if let Some(next) = target.filter(|next| *next != from) {
            activity::record(
                conn,
                current.transaction_id,
                None,
                activity::MILESTONE_UPDATED,
                &format!("{} marked {}", current.name, next),
            )?;
            info!(
                milestone_id = %milestone_id,
                transaction_id = %current.transaction_id,
                from = %from,
                to = %next,
                "milestone status changed"
            );
            roll_up_transaction(conn, current.transaction_id)?;
        }

        Ok(milestones::table.find(milestone_id).first(conn)?)
    })
}

fn roll_up_transaction(conn: &mut PgConnection, transaction_id: Uuid) -> Result<(), MilestoneError> {
    let status_value: String = transactions::table
        .find(transaction_id)
        .select(transactions::status)
        .first(conn)?;
    let Some(current) = TransactionStatus::parse(&status_value) else {
        return Ok(());
    };

    let rows: Vec<(String, String)> = milestones::table
        .filter(milestones::transaction_id.eq(transaction_id))
        .select((milestones::milestone_type, milestones::status))
        .load(conn)?;
    let summary: Vec<(MilestoneKind, MilestoneStatus)> = rows
        .iter()
        .filter_map(|(kind, status)| Some((MilestoneKind::parse(kind)?, status.parse().ok()?)))
        .collect();

    let next = rolled_up_status(current, &summary);
    if next != current {
        diesel::update(transactions::table.find(transaction_id))
            .set((
                transactions::status.eq(next.as_str()),
                transactions::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        activity::record(
            conn,
            transaction_id,
            None,
            activity::TRANSACTION_STATUS_CHANGED,
            &format!("Transaction moved from {current} to {next}"),
        )?;
        info!(transaction_id = %transaction_id, from = %current, to = %next, "transaction status rolled up");
    }
    Ok(())
}

/// Transaction status implied by its milestones. Draft, closed and cancelled
/// transactions are never moved by milestone activity.
pub fn rolled_up_status(
    current: TransactionStatus,
    milestones: &[(MilestoneKind, MilestoneStatus)],
) -> TransactionStatus {
    use TransactionStatus::*;

    if matches!(current, Draft | Closed | Cancelled) {
        return current;
    }

    let closing_done = milestones
        .iter()
        .any(|(kind, status)| *kind == MilestoneKind::Closing && *status == MilestoneStatus::Completed);
    if closing_done {
        return Closed;
    }

    let mut preliminaries = milestones
        .iter()
        .filter(|(kind, _)| *kind != MilestoneKind::Closing)
        .peekable();
    let all_preliminaries_done =
        preliminaries.peek().is_some() && preliminaries.all(|(_, status)| status.is_terminal());
    if all_preliminaries_done && matches!(current, New | Active) {
        return PendingClosing;
    }

    let any_progress = milestones.iter().any(|(_, status)| status.is_terminal());
    if current == New && any_progress {
        return Active;
    }

    current
}
