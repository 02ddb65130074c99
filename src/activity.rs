use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{ActivityEntry, NewActivityEntry};
use crate::schema::activity_log;

pub const TRANSACTION_CREATED: &str = "transaction_created";
pub const TRANSACTION_STATUS_CHANGED: &str = "transaction_status_changed";
pub const TRANSACTION_POPULATED: &str = "transaction_populated";
pub const MILESTONE_UPDATED: &str = "milestone_updated";
pub const DOCUMENT_UPLOADED: &str = "document_uploaded";
pub const DOCUMENT_SENT: &str = "document_sent";
pub const DOCUMENT_SIGNED: &str = "document_signed";
pub const DOCUMENT_COMPLETED: &str = "document_completed";

pub fn record(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    document_id: Option<Uuid>,
    action: &str,
    description: &str,
) -> QueryResult<()> {
    diesel::insert_into(activity_log::table)
        .values(&NewActivityEntry {
            id: Uuid::new_v4(),
            transaction_id,
            document_id,
            action: action.to_string(),
            description: description.to_string(),
        })
        .execute(conn)?;
    Ok(())
}

pub fn list_for_transaction(
    conn: &mut PgConnection,
    transaction_id: Uuid,
) -> QueryResult<Vec<ActivityEntry>> {
    activity_log::table
        .filter(activity_log::transaction_id.eq(transaction_id))
        .order(activity_log::created_at.desc())
        .load(conn)
}
