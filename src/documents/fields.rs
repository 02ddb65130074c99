//! Signable regions placed on a document. The set is always replaced whole.

use std::collections::HashSet;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{DocumentField, NewDocumentField};
use crate::schema::document_fields;

pub const FIELD_TYPES: &[&str] = &["signature", "initials", "date", "text", "checkbox"];

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    pub id: Option<Uuid>,
    pub page_number: i32,
    pub field_type: String,
    pub assignee_role: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{0}")]
    Invalid(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<FieldError> for AppError {
    fn from(value: FieldError) -> Self {
        match value {
            FieldError::Invalid(message) => AppError::bad_request(message),
            FieldError::Database(err) => AppError::from(err),
        }
    }
}

pub fn normalize_role(value: &str) -> String {
    value.trim().to_lowercase()
}

fn validate(document_id: Uuid, fields: &[FieldInput]) -> Result<Vec<NewDocumentField>, FieldError> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut rows = Vec::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        let field_type = field.field_type.trim().to_lowercase();
        if !FIELD_TYPES.contains(&field_type.as_str()) {
            return Err(FieldError::Invalid(format!(
                "field {index}: invalid field type '{}'. Allowed types: {}",
                field.field_type,
                FIELD_TYPES.join(", ")
            )));
        }
        let role = normalize_role(&field.assignee_role);
        if role.is_empty() {
            return Err(FieldError::Invalid(format!(
                "field {index}: assignee role must not be empty"
            )));
        }
        if field.page_number < 1 {
            return Err(FieldError::Invalid(format!(
                "field {index}: page number must be at least 1"
            )));
        }
        let geometry = [field.x, field.y, field.width, field.height];
        if geometry.iter().any(|value| !value.is_finite())
            || field.x < 0.0
            || field.y < 0.0
            || field.width <= 0.0
            || field.height <= 0.0
        {
            return Err(FieldError::Invalid(format!(
                "field {index}: bounding box must have a non-negative origin and positive size"
            )));
        }

        let id = field.id.unwrap_or_else(Uuid::new_v4);
        if !seen.insert(id) {
            return Err(FieldError::Invalid(format!("field {index}: duplicate id {id}")));
        }

        rows.push(NewDocumentField {
            id,
            document_id,
            page_number: field.page_number,
            field_type,
            assignee_role: role,
            x: field.x,
            y: field.y,
            width: field.width,
            height: field.height,
        });
    }

    Ok(rows)
}

pub fn list_fields(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<Vec<DocumentField>> {
    document_fields::table
        .filter(document_fields::document_id.eq(document_id))
        .order((
            document_fields::page_number.asc(),
            document_fields::y.asc(),
            document_fields::x.asc(),
        ))
        .load(conn)
}

/// Deletes every field on the document and inserts `fields` in one database
/// transaction. Inputs without an id get a fresh one.
pub fn replace_fields(
    conn: &mut PgConnection,
    document_id: Uuid,
    fields: &[FieldInput],
) -> Result<Vec<DocumentField>, FieldError> {
    let rows = validate(document_id, fields)?;

    conn.transaction(|conn| {
        let removed = diesel::delete(
            document_fields::table.filter(document_fields::document_id.eq(document_id)),
        )
        .execute(conn)?;

        if !rows.is_empty() {
            diesel::insert_into(document_fields::table)
                .values(&rows)
                .execute(conn)?;
        }

        info!(
            document_id = %document_id,
            removed,
            inserted = rows.len(),
            "replaced document fields"
        );
        Ok(list_fields(conn, document_id)?)
    })
}
