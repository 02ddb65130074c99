use std::fmt;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::models::{Document, NewDocument, Transaction};
use crate::schema::{documents, transactions};

pub mod fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Sent,
    Completed,
    Parsed,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Sent => "sent",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Parsed => "parsed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DocumentStatus::Draft),
            "sent" => Some(DocumentStatus::Sent),
            "completed" => Some(DocumentStatus::Completed),
            "parsed" => Some(DocumentStatus::Parsed),
            _ => None,
        }
    }

    /// Every signature has been captured.
    pub fn is_finished(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Parsed)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn storage_key(transaction_id: Uuid, document_id: Uuid) -> String {
    format!("transactions/{transaction_id}/documents/{document_id}")
}

/// `inline` disposition carrying the original file name, ASCII-safe and
/// RFC 5987 encoded.
pub fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();
    let encoded = utf8_percent_encode(&sanitized, NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}

/// A file already written to object storage under `storage_key`.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub document_id: Uuid,
    pub name: String,
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
}

impl StoredUpload {
    /// Prepares metadata for `bytes` before they are written. The content type
    /// falls back to a guess from the file name.
    pub fn describe(transaction_id: Uuid, name: &str, declared_type: Option<String>, bytes: &[u8]) -> Self {
        let document_id = Uuid::new_v4();
        let content_type = declared_type
            .filter(|value| !value.is_empty() && value != "application/octet-stream")
            .or_else(|| mime_guess::from_path(name).first().map(|mime| mime.to_string()));
        Self {
            document_id,
            name: name.to_string(),
            storage_key: storage_key(transaction_id, document_id),
            content_type,
            size_bytes: bytes.len() as i64,
            checksum: hex::encode(Sha256::digest(bytes)),
        }
    }
}

pub fn insert_upload(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    upload: &StoredUpload,
    status: DocumentStatus,
) -> QueryResult<Document> {
    conn.transaction(|conn| {
        let document: Document = diesel::insert_into(documents::table)
            .values(&NewDocument {
                id: upload.document_id,
                transaction_id,
                name: upload.name.clone(),
                storage_key: upload.storage_key.clone(),
                content_type: upload.content_type.clone(),
                size_bytes: upload.size_bytes,
                checksum: upload.checksum.clone(),
                status: status.as_str().to_string(),
            })
            .get_result(conn)?;
        activity::record(
            conn,
            transaction_id,
            Some(document.id),
            activity::DOCUMENT_UPLOADED,
            &format!("Uploaded {}", document.name),
        )?;
        info!(
            document_id = %document.id,
            transaction_id = %transaction_id,
            size_bytes = document.size_bytes,
            "stored document"
        );
        Ok(document)
    })
}

/// Loads a document together with its transaction, scoped to the owner.
pub fn find_owned(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: Uuid,
) -> QueryResult<(Document, Transaction)> {
    documents::table
        .inner_join(transactions::table)
        .filter(documents::id.eq(document_id))
        .filter(transactions::user_id.eq(user_id))
        .select((documents::all_columns, transactions::all_columns))
        .first(conn)
}

pub fn list_for_transaction(
    conn: &mut PgConnection,
    transaction_id: Uuid,
) -> QueryResult<Vec<Document>> {
    documents::table
        .filter(documents::transaction_id.eq(transaction_id))
        .order(documents::created_at.asc())
        .load(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_statuses() {
        assert!(!DocumentStatus::Draft.is_finished());
        assert!(!DocumentStatus::Sent.is_finished());
        assert!(DocumentStatus::Completed.is_finished());
        assert!(DocumentStatus::Parsed.is_finished());
        assert_eq!(DocumentStatus::parse("sent"), Some(DocumentStatus::Sent));
    }

    #[test]
    fn describe_hashes_and_guesses_type() {
        let tx = Uuid::new_v4();
        let upload = StoredUpload::describe(tx, "contract.pdf", None, b"hello");
        assert_eq!(upload.size_bytes, 5);
        assert_eq!(
            upload.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(upload.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(
            upload.storage_key,
            format!("transactions/{tx}/documents/{}", upload.document_id)
        );
    }

    #[test]
    fn content_disposition_escapes_names() {
        assert_eq!(inline_content_disposition(""), None);
        assert_eq!(
            inline_content_disposition("Offer \"final\".pdf").as_deref(),
            Some("inline; filename=\"Offer _final_.pdf\"; filename*=UTF-8''Offer%20%5Ffinal%5F%2Epdf")
        );
    }
}
