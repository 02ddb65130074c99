use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use diesel::prelude::*;
use diesel::r2d2::PoolError;
use serde::Serialize;
use thiserror::Error;
use tokio::task::{self, JoinError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::PgPool;
use crate::error::AppError;
use crate::milestones::{MilestoneStatus, OUTSTANDING_STATUSES};
use crate::models::{Milestone, NewSentReminder, NotificationPreference, Transaction, User};
use crate::schema::{milestones, notification_preferences, sent_reminders, transactions, users};
use crate::transactions::TransactionStatus;

use super::preferences::Preferences;
use super::templates::{DigestItem, DigestPayload, MilestonePayload};
use super::{DeliveryStatus, Notification, NotificationTransport, TemplateId};

pub const DIGEST_WINDOW_DAYS: i64 = 7;

const UNNAMED_PROPERTY: &str = "your transaction";

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error("failed to encode notification payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("database task failed: {0}")]
    Task(#[from] JoinError),
}

impl From<ReminderError> for AppError {
    fn from(value: ReminderError) -> Self {
        match value {
            ReminderError::Database(err) => err.into(),
            other => AppError::internal(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Deadline,
    Overdue,
}

impl ReminderKind {
    /// Stored in `sent_reminders.reminder_type`; matches the template name.
    pub fn as_str(self) -> &'static str {
        self.template().as_str()
    }

    pub fn template(self) -> TemplateId {
        match self {
            ReminderKind::Deadline => TemplateId::DeadlineReminder,
            ReminderKind::Overdue => TemplateId::OverdueAlert,
        }
    }

    fn enabled(self, prefs: &Preferences) -> bool {
        match self {
            ReminderKind::Deadline => prefs.deadline_reminders,
            ReminderKind::Overdue => prefs.overdue_alerts,
        }
    }
}

/// Which reminder, if any, a pending milestone due on `due_date` earns today.
pub fn reminder_kind(due_date: NaiveDate, today: NaiveDate, lead_days: i32) -> Option<ReminderKind> {
    if due_date < today {
        Some(ReminderKind::Overdue)
    } else if due_date <= today + Duration::days(i64::from(lead_days)) {
        Some(ReminderKind::Deadline)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub user_id: Uuid,
    pub recipient: String,
    pub template: TemplateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<Uuid>,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub sent: usize,
    pub failed: usize,
    /// Reminders already delivered earlier the same day.
    pub skipped: usize,
    pub deliveries: Vec<DeliveryRecord>,
}

impl RunReport {
    fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            sent: 0,
            failed: 0,
            skipped: 0,
            deliveries: Vec::new(),
        }
    }

    fn push(&mut self, record: DeliveryRecord) {
        match record.status {
            DeliveryStatus::Sent => self.sent += 1,
            DeliveryStatus::Failed(_) => self.failed += 1,
        }
        self.deliveries.push(record);
    }
}

fn recipients(conn: &mut PgConnection) -> QueryResult<Vec<(User, Option<NotificationPreference>)>> {
    users::table
        .left_join(notification_preferences::table)
        .order(users::created_at.asc())
        .load(conn)
}

fn closed_statuses() -> [&'static str; 2] {
    [
        TransactionStatus::Closed.as_str(),
        TransactionStatus::Cancelled.as_str(),
    ]
}

/// Runs `f` on a pooled connection off the async runtime. The connection goes
/// back to the pool as soon as `f` returns, so none is held across a send.
async fn with_conn<T, F>(pool: &PgPool, f: F) -> Result<T, ReminderError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, ReminderError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

/// A reminder the daily scan intends to deliver, with everything the
/// message needs.
#[derive(Debug, Clone)]
struct DueReminder {
    user: User,
    milestone: Milestone,
    property_address: String,
    kind: ReminderKind,
}

fn collect_due_reminders(
    conn: &mut PgConnection,
    today: NaiveDate,
    default_lead_days: i32,
) -> Result<Vec<DueReminder>, ReminderError> {
    let mut due = Vec::new();

    for (user, row) in recipients(conn)? {
        let prefs = Preferences::from_row(row.as_ref(), default_lead_days);
        if !prefs.deadline_reminders && !prefs.overdue_alerts {
            continue;
        }

        let horizon = today + Duration::days(i64::from(prefs.reminder_days_before));
        let candidates: Vec<(Milestone, Transaction)> = milestones::table
            .inner_join(transactions::table)
            .filter(transactions::user_id.eq(user.id))
            .filter(transactions::status.ne_all(closed_statuses()))
            .filter(milestones::status.eq_any(OUTSTANDING_STATUSES))
            .filter(milestones::due_date.le(horizon))
            .order((milestones::due_date.asc(), milestones::position.asc()))
            .load(conn)?;

        for (milestone, transaction) in candidates {
            let Some(kind) = reminder_kind(milestone.due_date, today, prefs.reminder_days_before)
            else {
                continue;
            };
            if !kind.enabled(&prefs) {
                continue;
            }
            due.push(DueReminder {
                user: user.clone(),
                milestone,
                property_address: transaction
                    .property_address
                    .unwrap_or_else(|| UNNAMED_PROPERTY.to_string()),
                kind,
            });
        }
    }

    Ok(due)
}

/// Daily scan: deadline reminders for pending milestones due within each
/// user's lead window and overdue alerts for pending milestones past due.
///
/// Each (milestone, user, kind, day) is claimed in `sent_reminders` before
/// sending; a failed send releases the claim so a later run retries it.
pub async fn run_daily_scan(
    pool: &PgPool,
    transport: &dyn NotificationTransport,
    today: NaiveDate,
    default_lead_days: i32,
) -> Result<RunReport, ReminderError> {
    let mut report = RunReport::new(today);
    let due = with_conn(pool, move |conn| {
        collect_due_reminders(conn, today, default_lead_days)
    })
    .await?;

    for DueReminder {
        user,
        milestone,
        property_address,
        kind,
    } in due
    {
        let claim = NewSentReminder {
            id: Uuid::new_v4(),
            milestone_id: milestone.id,
            user_id: user.id,
            reminder_type: kind.as_str().to_string(),
            sent_on: today,
        };
        let claim_id = claim.id;
        let claimed = with_conn(pool, move |conn| {
            Ok(diesel::insert_into(sent_reminders::table)
                .values(&claim)
                .on_conflict_do_nothing()
                .execute(conn)?)
        })
        .await?;
        if claimed == 0 {
            report.skipped += 1;
            continue;
        }

        let payload = MilestonePayload {
            recipient_name: user.name.clone(),
            milestone_name: milestone.name.clone(),
            property_address,
            due_date: milestone.due_date,
            days_until_due: (milestone.due_date - today).num_days(),
        };
        let notification = Notification::template(
            user.email.clone(),
            kind.template(),
            serde_json::to_value(&payload)?,
        );

        let status = match transport.send(&notification).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(err) => {
                warn!(
                    user_id = %user.id,
                    milestone_id = %milestone.id,
                    kind = kind.as_str(),
                    error = %err,
                    "reminder delivery failed"
                );
                with_conn(pool, move |conn| {
                    Ok(diesel::delete(sent_reminders::table.find(claim_id)).execute(conn)?)
                })
                .await?;
                DeliveryStatus::Failed(err.to_string())
            }
        };

        report.push(DeliveryRecord {
            user_id: user.id,
            recipient: user.email,
            template: kind.template(),
            milestone_id: Some(milestone.id),
            status,
        });
    }

    info!(
        run_date = %today,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        "daily reminder scan finished"
    );
    Ok(report)
}

fn digest_item(milestone: &Milestone, addresses: &HashMap<Uuid, &str>) -> DigestItem {
    DigestItem {
        milestone_name: milestone.name.clone(),
        property_address: addresses
            .get(&milestone.transaction_id)
            .copied()
            .unwrap_or(UNNAMED_PROPERTY)
            .to_string(),
        due_date: milestone.due_date,
    }
}

/// Builds one user's weekly summary from their transactions and milestones.
pub fn summarize_week(
    recipient_name: &str,
    transactions: &[Transaction],
    milestones: &[Milestone],
    today: NaiveDate,
) -> DigestPayload {
    let open: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| TransactionStatus::parse(&tx.status).is_some_and(TransactionStatus::is_open))
        .collect();
    let addresses: HashMap<Uuid, &str> = transactions
        .iter()
        .map(|tx| (tx.id, tx.property_address.as_deref().unwrap_or(UNNAMED_PROPERTY)))
        .collect();
    let is_open = |id: Uuid| open.iter().any(|tx| tx.id == id);

    let week_ahead = today + Duration::days(DIGEST_WINDOW_DAYS);
    let week_behind = today - Duration::days(DIGEST_WINDOW_DAYS);

    let mut upcoming = Vec::new();
    let mut overdue = Vec::new();
    let mut completed = Vec::new();
    for milestone in milestones {
        if OUTSTANDING_STATUSES.contains(&milestone.status.as_str())
            && is_open(milestone.transaction_id)
        {
            if milestone.due_date < today {
                overdue.push(digest_item(milestone, &addresses));
            } else if milestone.due_date <= week_ahead {
                upcoming.push(digest_item(milestone, &addresses));
            }
        } else if milestone.status == MilestoneStatus::Completed.as_str() {
            let finished_on = milestone.completed_at.map(|at| at.date());
            if finished_on.is_some_and(|day| day >= week_behind && day <= today) {
                completed.push(digest_item(milestone, &addresses));
            }
        }
    }
    for list in [&mut upcoming, &mut overdue, &mut completed] {
        list.sort_by(|a, b| a.due_date.cmp(&b.due_date));
    }

    DigestPayload {
        recipient_name: recipient_name.to_string(),
        active_transactions: open.len() as i64,
        total_volume_cents: open.iter().filter_map(|tx| tx.purchase_price_cents).sum(),
        upcoming,
        overdue,
        completed,
    }
}

fn collect_digests(
    conn: &mut PgConnection,
    today: NaiveDate,
) -> Result<Vec<(User, DigestPayload)>, ReminderError> {
    let mut digests = Vec::new();

    for (user, row) in recipients(conn)? {
        if row.as_ref().is_some_and(|prefs| !prefs.weekly_digest) {
            continue;
        }

        let owned: Vec<Transaction> = transactions::table
            .filter(transactions::user_id.eq(user.id))
            .load(conn)?;
        let ids: Vec<Uuid> = owned.iter().map(|tx| tx.id).collect();
        let tracked: Vec<Milestone> = if ids.is_empty() {
            Vec::new()
        } else {
            milestones::table
                .filter(milestones::transaction_id.eq_any(&ids))
                .load(conn)?
        };

        let payload = summarize_week(&user.name, &owned, &tracked, today);
        digests.push((user, payload));
    }

    Ok(digests)
}

/// Weekly digest: one summary per user who has not opted out.
pub async fn run_weekly_digest(
    pool: &PgPool,
    transport: &dyn NotificationTransport,
    today: NaiveDate,
) -> Result<RunReport, ReminderError> {
    let mut report = RunReport::new(today);
    let digests = with_conn(pool, move |conn| collect_digests(conn, today)).await?;

    for (user, payload) in digests {
        let notification = Notification::template(
            user.email.clone(),
            TemplateId::WeeklyDigest,
            serde_json::to_value(&payload)?,
        );

        let status = match transport.send(&notification).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "weekly digest delivery failed");
                DeliveryStatus::Failed(err.to_string())
            }
        };
        report.push(DeliveryRecord {
            user_id: user.id,
            recipient: user.email,
            template: TemplateId::WeeklyDigest,
            milestone_id: None,
            status,
        });
    }

    info!(
        run_date = %today,
        sent = report.sent,
        failed = report.failed,
        "weekly digest finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stamp() -> NaiveDateTime {
        chrono::DateTime::from_timestamp(1_767_225_600, 0)
            .unwrap()
            .naive_utc()
    }

    fn transaction(status: &str, price: Option<i64>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            property_address: Some("42 Elm Road".into()),
            status: status.into(),
            buyer_name: None,
            seller_name: None,
            purchase_price_cents: price,
            effective_date: None,
            closing_date: None,
            financing_type: None,
            initial_deposit_cents: None,
            additional_deposit_cents: None,
            initial_deposit_due: None,
            additional_deposit_due: None,
            created_at: stamp(),
            updated_at: stamp(),
        }
    }

    fn milestone(
        tx: &Transaction,
        name: &str,
        due: NaiveDate,
        status: &str,
        completed_at: Option<NaiveDateTime>,
    ) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            name: name.into(),
            milestone_type: "other".into(),
            due_date: due,
            status: status.into(),
            notes: None,
            position: 0,
            completed_at,
            created_at: stamp(),
            updated_at: stamp(),
        }
    }

    #[test]
    fn classifies_reminder_windows() {
        let today = day(2026, 2, 10);
        assert_eq!(reminder_kind(day(2026, 2, 9), today, 3), Some(ReminderKind::Overdue));
        assert_eq!(reminder_kind(today, today, 3), Some(ReminderKind::Deadline));
        assert_eq!(reminder_kind(day(2026, 2, 13), today, 3), Some(ReminderKind::Deadline));
        assert_eq!(reminder_kind(day(2026, 2, 14), today, 3), None);
    }

    #[test]
    fn zero_lead_days_only_reminds_on_due_date() {
        let today = day(2026, 2, 10);
        assert_eq!(reminder_kind(today, today, 0), Some(ReminderKind::Deadline));
        assert_eq!(reminder_kind(day(2026, 2, 11), today, 0), None);
    }

    #[test]
    fn weekly_summary_buckets_milestones() {
        let today = day(2026, 2, 10);
        let active = transaction("active", Some(450_000_00));
        let fresh = transaction("new", Some(300_000_00));
        let closed = transaction("closed", Some(999_000_00));
        let done_at = day(2026, 2, 5).and_hms_opt(15, 0, 0).unwrap();
        let stale_done = day(2026, 1, 20).and_hms_opt(15, 0, 0).unwrap();

        let milestones = vec![
            milestone(&active, "Appraisal", day(2026, 2, 12), "pending", None),
            milestone(&active, "Home Inspection", day(2026, 2, 1), "pending", None),
            milestone(&active, "Attorney Review Ends", day(2026, 1, 25), "completed", Some(done_at)),
            milestone(&active, "Initial Deposit Due", day(2026, 1, 22), "completed", Some(stale_done)),
            milestone(&fresh, "Closing", day(2026, 3, 30), "pending", None),
            milestone(&closed, "Closing", day(2026, 2, 11), "pending", None),
        ];

        let digest = summarize_week("Avery", &[active, fresh, closed], &milestones, today);
        assert_eq!(digest.active_transactions, 2);
        assert_eq!(digest.total_volume_cents, 750_000_00);
        assert_eq!(digest.upcoming.len(), 1);
        assert_eq!(digest.upcoming[0].milestone_name, "Appraisal");
        assert_eq!(digest.overdue.len(), 1);
        assert_eq!(digest.overdue[0].milestone_name, "Home Inspection");
        assert_eq!(digest.completed.len(), 1);
        assert_eq!(digest.completed[0].milestone_name, "Attorney Review Ends");
    }

    #[test]
    fn stored_overdue_milestones_stay_in_the_summary() {
        let today = day(2026, 2, 10);
        let active = transaction("active", Some(450_000_00));
        let milestones = vec![
            milestone(&active, "Home Inspection", day(2026, 2, 1), "overdue", None),
            milestone(&active, "Appraisal", day(2026, 2, 12), "overdue", None),
        ];

        let digest = summarize_week("Avery", &[active], &milestones, today);
        assert_eq!(digest.overdue.len(), 1);
        assert_eq!(digest.overdue[0].milestone_name, "Home Inspection");
        assert_eq!(digest.upcoming.len(), 1);
        assert_eq!(digest.upcoming[0].milestone_name, "Appraisal");
    }

    #[test]
    fn delivery_records_serialize_flat() {
        let record = DeliveryRecord {
            user_id: Uuid::nil(),
            recipient: "dana@example.com".into(),
            template: TemplateId::OverdueAlert,
            milestone_id: None,
            status: DeliveryStatus::Failed("timeout".into()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "timeout");
        assert_eq!(value["template"], "overdue_alert");
    }
}
