use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NotificationPreference, UpsertNotificationPreference};
use crate::schema::notification_preferences;

use super::{DEFAULT_REMINDER_LEAD_DAYS, MAX_REMINDER_LEAD_DAYS};

/// A user's notification settings with defaults filled in for missing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub deadline_reminders: bool,
    pub overdue_alerts: bool,
    pub weekly_digest: bool,
    pub reminder_days_before: i32,
}

impl Preferences {
    pub fn defaults(lead_days: i32) -> Self {
        Self {
            deadline_reminders: true,
            overdue_alerts: true,
            weekly_digest: true,
            reminder_days_before: lead_days.clamp(0, MAX_REMINDER_LEAD_DAYS),
        }
    }

    pub fn from_row(row: Option<&NotificationPreference>, default_lead_days: i32) -> Self {
        match row {
            Some(row) => Self {
                deadline_reminders: row.deadline_reminders,
                overdue_alerts: row.overdue_alerts,
                weekly_digest: row.weekly_digest,
                reminder_days_before: row.reminder_days_before.clamp(0, MAX_REMINDER_LEAD_DAYS),
            },
            None => Self::defaults(default_lead_days),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self::defaults(DEFAULT_REMINDER_LEAD_DAYS)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PreferencesPatch {
    pub deadline_reminders: Option<bool>,
    pub overdue_alerts: Option<bool>,
    pub weekly_digest: Option<bool>,
    pub reminder_days_before: Option<i32>,
}

impl PreferencesPatch {
    pub fn apply(&self, current: Preferences) -> Result<Preferences, AppError> {
        let lead = self
            .reminder_days_before
            .unwrap_or(current.reminder_days_before);
        if !(0..=MAX_REMINDER_LEAD_DAYS).contains(&lead) {
            return Err(AppError::bad_request(format!(
                "reminder_days_before must be between 0 and {MAX_REMINDER_LEAD_DAYS}"
            )));
        }
        Ok(Preferences {
            deadline_reminders: self.deadline_reminders.unwrap_or(current.deadline_reminders),
            overdue_alerts: self.overdue_alerts.unwrap_or(current.overdue_alerts),
            weekly_digest: self.weekly_digest.unwrap_or(current.weekly_digest),
            reminder_days_before: lead,
        })
    }
}

pub fn load(conn: &mut PgConnection, user_id: Uuid, default_lead_days: i32) -> QueryResult<Preferences> {
    let row = notification_preferences::table
        .find(user_id)
        .first::<NotificationPreference>(conn)
        .optional()?;
    Ok(Preferences::from_row(row.as_ref(), default_lead_days))
}

pub fn save(conn: &mut PgConnection, user_id: Uuid, prefs: Preferences) -> QueryResult<Preferences> {
    let row = UpsertNotificationPreference {
        user_id,
        deadline_reminders: prefs.deadline_reminders,
        overdue_alerts: prefs.overdue_alerts,
        weekly_digest: prefs.weekly_digest,
        reminder_days_before: prefs.reminder_days_before,
        updated_at: Utc::now().naive_utc(),
    };

    let saved: NotificationPreference = diesel::insert_into(notification_preferences::table)
        .values(&row)
        .on_conflict(notification_preferences::user_id)
        .do_update()
        .set(&row)
        .get_result(conn)?;

    Ok(Preferences::from_row(Some(&saved), prefs.reminder_days_before))
}
