use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = transactions)]
#[diesel(belongs_to(User))]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_address: Option<String>,
    pub status: String,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub effective_date: Option<NaiveDate>,
    pub closing_date: Option<NaiveDate>,
    pub financing_type: Option<String>,
    pub initial_deposit_cents: Option<i64>,
    pub additional_deposit_cents: Option<i64>,
    pub initial_deposit_due: Option<NaiveDate>,
    pub additional_deposit_due: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_address: Option<String>,
    pub status: String,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub effective_date: Option<NaiveDate>,
    pub closing_date: Option<NaiveDate>,
    pub financing_type: Option<String>,
    pub initial_deposit_cents: Option<i64>,
    pub additional_deposit_cents: Option<i64>,
    pub initial_deposit_due: Option<NaiveDate>,
    pub additional_deposit_due: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = milestones)]
#[diesel(belongs_to(Transaction))]
pub struct Milestone {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub milestone_type: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub notes: Option<String>,
    pub position: i32,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = milestones)]
pub struct NewMilestone {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub milestone_type: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub position: i32,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = parties)]
#[diesel(belongs_to(Transaction))]
pub struct Party {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub role: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = parties)]
pub struct NewParty {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub role: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Transaction))]
pub struct Document {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_fields)]
#[diesel(belongs_to(Document))]
pub struct DocumentField {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: i32,
    pub field_type: String,
    pub assignee_role: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_fields)]
pub struct NewDocumentField {
    pub id: Uuid,
    pub document_id: Uuid,
    pub page_number: i32,
    pub field_type: String,
    pub assignee_role: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = signing_sessions)]
#[diesel(belongs_to(Document))]
pub struct SigningSession {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_role: String,
    pub signer_name: String,
    pub signer_email: String,
    pub token: String,
    pub status: String,
    pub signed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = signing_sessions)]
pub struct NewSigningSession {
    pub id: Uuid,
    pub document_id: Uuid,
    pub signer_role: String,
    pub signer_name: String,
    pub signer_email: String,
    pub token: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = field_values)]
#[diesel(belongs_to(SigningSession, foreign_key = session_id))]
#[diesel(belongs_to(DocumentField, foreign_key = field_id))]
pub struct FieldValue {
    pub id: Uuid,
    pub field_id: Uuid,
    pub session_id: Uuid,
    pub value: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = field_values)]
pub struct NewFieldValue {
    pub id: Uuid,
    pub field_id: Uuid,
    pub session_id: Uuid,
    pub value: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activity_log)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub document_id: Option<Uuid>,
    pub action: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = activity_log)]
pub struct NewActivityEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub document_id: Option<Uuid>,
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notification_preferences)]
#[diesel(primary_key(user_id))]
pub struct NotificationPreference {
    pub user_id: Uuid,
    pub deadline_reminders: bool,
    pub overdue_alerts: bool,
    pub weekly_digest: bool,
    pub reminder_days_before: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = notification_preferences)]
pub struct UpsertNotificationPreference {
    pub user_id: Uuid,
    pub deadline_reminders: bool,
    pub overdue_alerts: bool,
    pub weekly_digest: bool,
    pub reminder_days_before: i32,
    pub updated_at: NaiveDateTime,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = sent_reminders)]
pub struct SentReminder {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub user_id: Uuid,
    pub reminder_type: String,
    pub sent_on: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sent_reminders)]
pub struct NewSentReminder {
    pub id: Uuid,
    pub milestone_id: Uuid,
    pub user_id: Uuid,
    pub reminder_type: String,
    pub sent_on: NaiveDate,
}
