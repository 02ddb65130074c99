//! Per-signer signing sessions and the completion cascade.
//!
//! A session is addressed only by its token. Completing the last outstanding
//! session of a document marks the document completed and, when the parent
//! transaction is still a draft, runs the contract parser and populates the
//! transaction from its output. Completions lock the document row first and
//! both steps are guarded by conditional updates, so the cascade runs exactly
//! once per document even when the last signers finish together.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use diesel::dsl::count_star;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity;
use crate::documents::fields::{list_fields, normalize_role};
use crate::documents::DocumentStatus;
use crate::error::AppError;
use crate::models::{
    Document, DocumentField, FieldValue, NewFieldValue, NewSigningSession, SigningSession,
    Transaction,
};
use crate::parser::{ContractParser, ParseRequest, ParserError, SignerInfo};
use crate::schema::{document_fields, documents, field_values, signing_sessions, transactions};
use crate::transactions::{populate_from_contract, IntakeError, TransactionStatus};

pub mod token;

pub use token::generate_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Viewed,
    Signed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Viewed => "viewed",
            SessionStatus::Signed => "signed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("no fields placed on this document")]
    NoFieldsPlaced,
    #[error("at least one signer is required")]
    NoSigners,
    #[error("invalid signer: {0}")]
    InvalidSigner(String),
    #[error("document has already been completed")]
    DocumentFinished,
    #[error("signing session not found")]
    NotFound,
    #[error("document already signed")]
    AlreadySigned,
    #[error("{0}")]
    InvalidFieldValue(String),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<SigningError> for AppError {
    fn from(value: SigningError) -> Self {
        match value {
            SigningError::NoFieldsPlaced
            | SigningError::NoSigners
            | SigningError::InvalidSigner(_)
            | SigningError::InvalidFieldValue(_) => AppError::bad_request(value.to_string()),
            SigningError::DocumentFinished | SigningError::AlreadySigned => {
                AppError::conflict(value.to_string())
            }
            SigningError::NotFound => AppError::not_found_with(value.to_string()),
            SigningError::Parser(err) => AppError::from(err),
            SigningError::Intake(err) => AppError::from(err),
            SigningError::Database(diesel::result::Error::NotFound) => {
                AppError::not_found_with("signing session not found")
            }
            SigningError::Database(err) => AppError::from(err),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerInput {
    pub role: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldValueInput {
    pub field_id: Uuid,
    pub value: String,
}

#[derive(Debug)]
pub struct ResolvedSession {
    pub session: SigningSession,
    pub document: Document,
    pub fields: Vec<DocumentField>,
    pub values: Vec<FieldValue>,
}

#[derive(Debug)]
pub struct CompletionOutcome {
    pub session: SigningSession,
    pub remaining: i64,
    pub document_status: DocumentStatus,
    pub transaction_populated: bool,
}

fn validate_signers(signers: &[SignerInput]) -> Result<Vec<SignerInfo>, SigningError> {
    if signers.is_empty() {
        return Err(SigningError::NoSigners);
    }
    signers
        .iter()
        .map(|signer| {
            let role = normalize_role(&signer.role);
            let name = signer.name.trim();
            let email = signer.email.trim().to_lowercase();
            if role.is_empty() {
                return Err(SigningError::InvalidSigner("role must not be empty".into()));
            }
            if name.is_empty() {
                return Err(SigningError::InvalidSigner("name must not be empty".into()));
            }
            if !is_plausible_email(&email) {
                return Err(SigningError::InvalidSigner(format!(
                    "'{}' is not a valid email address",
                    signer.email
                )));
            }
            Ok(SignerInfo {
                role,
                name: name.to_string(),
                email,
            })
        })
        .collect()
}

fn is_plausible_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub fn list_sessions(conn: &mut PgConnection, document_id: Uuid) -> QueryResult<Vec<SigningSession>> {
    signing_sessions::table
        .filter(signing_sessions::document_id.eq(document_id))
        .order(signing_sessions::created_at.asc())
        .load(conn)
}

/// Issues one session per signer and marks the document sent. Requires at
/// least one placed field.
pub fn create_sessions(
    conn: &mut PgConnection,
    document: &Document,
    signers: &[SignerInput],
) -> Result<Vec<SigningSession>, SigningError> {
    let signers = validate_signers(signers)?;

    conn.transaction(|conn| {
        let current: Document = documents::table.find(document.id).for_update().first(conn)?;
        if DocumentStatus::parse(&current.status).is_some_and(DocumentStatus::is_finished) {
            return Err(SigningError::DocumentFinished);
        }

        let placed: i64 = document_fields::table
            .filter(document_fields::document_id.eq(document.id))
            .select(count_star())
            .first(conn)?;
        if placed == 0 {
            return Err(SigningError::NoFieldsPlaced);
        }

        let rows: Vec<NewSigningSession> = signers
            .iter()
            .map(|signer| NewSigningSession {
                id: Uuid::new_v4(),
                document_id: document.id,
                signer_role: signer.role.clone(),
                signer_name: signer.name.clone(),
                signer_email: signer.email.clone(),
                token: generate_token(),
                status: SessionStatus::Pending.as_str().to_string(),
            })
            .collect();
        diesel::insert_into(signing_sessions::table)
            .values(&rows)
            .execute(conn)?;

        diesel::update(documents::table.find(document.id))
            .set((
                documents::status.eq(DocumentStatus::Sent.as_str()),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let names: Vec<String> = signers
            .iter()
            .map(|signer| format!("{} ({})", signer.name, signer.role))
            .collect();
        activity::record(
            conn,
            document.transaction_id,
            Some(document.id),
            activity::DOCUMENT_SENT,
            &format!("{} sent for signature to {}", current.name, names.join(", ")),
        )?;

        info!(
            document_id = %document.id,
            signer_count = rows.len(),
            "created signing sessions"
        );

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        Ok(signing_sessions::table
            .filter(signing_sessions::id.eq_any(ids))
            .order(signing_sessions::created_at.asc())
            .load(conn)?)
    })
}

fn find_by_token(conn: &mut PgConnection, token: &str) -> Result<SigningSession, SigningError> {
    if !token::looks_like_token(token) {
        return Err(SigningError::NotFound);
    }
    signing_sessions::table
        .filter(signing_sessions::token.eq(token))
        .first(conn)
        .optional()?
        .ok_or(SigningError::NotFound)
}

/// The document a signing link points at, without touching session state.
pub fn document_for_token(conn: &mut PgConnection, token: &str) -> Result<Document, SigningError> {
    let session = find_by_token(conn, token)?;
    Ok(documents::table.find(session.document_id).first(conn)?)
}

/// Looks a session up by token. The first retrieval of a pending session
/// moves it to viewed.
pub fn resolve_by_token(conn: &mut PgConnection, token: &str) -> Result<ResolvedSession, SigningError> {
    let session = find_by_token(conn, token)?;

    let viewed = diesel::update(
        signing_sessions::table
            .filter(signing_sessions::id.eq(session.id))
            .filter(signing_sessions::status.eq(SessionStatus::Pending.as_str())),
    )
    .set((
        signing_sessions::status.eq(SessionStatus::Viewed.as_str()),
        signing_sessions::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;
    if viewed > 0 {
        info!(session_id = %session.id, document_id = %session.document_id, "signing session viewed");
    }

    let session: SigningSession = signing_sessions::table.find(session.id).first(conn)?;
    let document: Document = documents::table.find(session.document_id).first(conn)?;
    let fields = list_fields(conn, document.id)?;
    let values: Vec<FieldValue> = field_values::table
        .filter(field_values::session_id.eq(session.id))
        .order(field_values::created_at.asc())
        .load(conn)?;

    Ok(ResolvedSession {
        session,
        document,
        fields,
        values,
    })
}

fn validate_values(
    session: &SigningSession,
    fields: &[DocumentField],
    values: &[FieldValueInput],
) -> Result<Vec<NewFieldValue>, SigningError> {
    let by_id: HashMap<Uuid, &DocumentField> = fields.iter().map(|field| (field.id, field)).collect();

    values
        .iter()
        .map(|input| {
            let field = by_id.get(&input.field_id).ok_or_else(|| {
                SigningError::InvalidFieldValue(format!(
                    "field {} does not belong to this document",
                    input.field_id
                ))
            })?;
            if field.assignee_role != session.signer_role {
                return Err(SigningError::InvalidFieldValue(format!(
                    "field {} is assigned to role {}",
                    field.id, field.assignee_role
                )));
            }
            Ok(NewFieldValue {
                id: Uuid::new_v4(),
                field_id: field.id,
                session_id: session.id,
                value: input.value.clone(),
            })
        })
        .collect()
}

/// Records a signature and runs the completion cascade when it was the last
/// outstanding one. Everything happens in one database transaction; a parser
/// failure rolls the signature back so the signer can retry.
pub fn complete_session(
    conn: &mut PgConnection,
    parser: &dyn ContractParser,
    token: &str,
    values: &[FieldValueInput],
) -> Result<CompletionOutcome, SigningError> {
    conn.transaction(|conn| {
        let session = find_by_token(conn, token)?;

        // Completions of one document serialize on its row, so the count of
        // outstanding sessions below always sees the other signers' commits.
        let document: Document = documents::table
            .find(session.document_id)
            .for_update()
            .first(conn)?;
        let session: SigningSession = signing_sessions::table.find(session.id).first(conn)?;
        if session.status == SessionStatus::Signed.as_str() {
            return Err(SigningError::AlreadySigned);
        }

        let fields = list_fields(conn, session.document_id)?;
        let rows = validate_values(&session, &fields, values)?;

        let now = Utc::now().naive_utc();
        let claimed = diesel::update(
            signing_sessions::table
                .filter(signing_sessions::id.eq(session.id))
                .filter(signing_sessions::status.ne(SessionStatus::Signed.as_str())),
        )
        .set((
            signing_sessions::status.eq(SessionStatus::Signed.as_str()),
            signing_sessions::signed_at.eq(Some(now)),
            signing_sessions::updated_at.eq(now),
        ))
        .execute(conn)?;
        if claimed == 0 {
            return Err(SigningError::AlreadySigned);
        }

        if !rows.is_empty() {
            diesel::insert_into(field_values::table)
                .values(&rows)
                .execute(conn)?;
        }

        activity::record(
            conn,
            document.transaction_id,
            Some(document.id),
            activity::DOCUMENT_SIGNED,
            &format!(
                "{} signed by {} ({})",
                document.name, session.signer_name, session.signer_role
            ),
        )?;
        info!(
            session_id = %session.id,
            document_id = %document.id,
            role = %session.signer_role,
            "signing session completed"
        );

        let remaining: i64 = signing_sessions::table
            .filter(signing_sessions::document_id.eq(document.id))
            .filter(signing_sessions::status.ne(SessionStatus::Signed.as_str()))
            .select(count_star())
            .first(conn)?;

        let mut document_status =
            DocumentStatus::parse(&document.status).unwrap_or(DocumentStatus::Sent);
        let mut transaction_populated = false;

        if remaining == 0 {
            let cascade = run_completion_cascade(conn, parser, &document)?;
            if let Some(status) = cascade.status {
                document_status = status;
            }
            transaction_populated = cascade.populated;
        }

        let session: SigningSession = signing_sessions::table.find(session.id).first(conn)?;
        Ok(CompletionOutcome {
            session,
            remaining,
            document_status,
            transaction_populated,
        })
    })
}

struct CascadeResult {
    status: Option<DocumentStatus>,
    populated: bool,
}

fn run_completion_cascade(
    conn: &mut PgConnection,
    parser: &dyn ContractParser,
    document: &Document,
) -> Result<CascadeResult, SigningError> {
    let now = Utc::now().naive_utc();
    let completed = diesel::update(
        documents::table
            .filter(documents::id.eq(document.id))
            .filter(documents::status.eq(DocumentStatus::Sent.as_str())),
    )
    .set((
        documents::status.eq(DocumentStatus::Completed.as_str()),
        documents::updated_at.eq(now),
    ))
    .execute(conn)?;

    if completed == 0 {
        warn!(document_id = %document.id, status = %document.status, "completion cascade already ran");
        return Ok(CascadeResult {
            status: None,
            populated: false,
        });
    }

    activity::record(
        conn,
        document.transaction_id,
        Some(document.id),
        activity::DOCUMENT_COMPLETED,
        &format!("{} completed by all signers", document.name),
    )?;
    info!(document_id = %document.id, "document completed");

    let transaction: Transaction = transactions::table
        .find(document.transaction_id)
        .for_update()
        .first(conn)?;
    if TransactionStatus::parse(&transaction.status) != Some(TransactionStatus::Draft) {
        return Ok(CascadeResult {
            status: Some(DocumentStatus::Completed),
            populated: false,
        });
    }

    let signers: Vec<SignerInfo> = list_sessions(conn, document.id)?
        .into_iter()
        .map(|session| SignerInfo {
            role: session.signer_role,
            name: session.signer_name,
            email: session.signer_email,
        })
        .collect();
    let parsed = parser.parse(&ParseRequest {
        document_name: document.name.clone(),
        signers,
    })?;
    populate_from_contract(conn, &transaction, &parsed)?;

    diesel::update(documents::table.find(document.id))
        .set((
            documents::status.eq(DocumentStatus::Parsed.as_str()),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    info!(
        document_id = %document.id,
        transaction_id = %transaction.id,
        "contract parsed after signing"
    );

    Ok(CascadeResult {
        status: Some(DocumentStatus::Parsed),
        populated: true,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn signer(role: &str, name: &str, email: &str) -> SignerInput {
        SignerInput {
            role: role.into(),
            name: name.into(),
            email: email.into(),
        }
    }

    fn timestamp() -> NaiveDateTime {
        chrono::DateTime::from_timestamp(1_767_225_600, 0)
            .unwrap()
            .naive_utc()
    }

    fn field(role: &str) -> DocumentField {
        DocumentField {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            page_number: 1,
            field_type: "signature".into(),
            assignee_role: role.into(),
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 20.0,
            created_at: timestamp(),
        }
    }

    fn session(role: &str) -> SigningSession {
        SigningSession {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            signer_role: role.into(),
            signer_name: "Dana".into(),
            signer_email: "dana@example.com".into(),
            token: generate_token(),
            status: "viewed".into(),
            signed_at: None,
            created_at: timestamp(),
            updated_at: timestamp(),
        }
    }

    #[test]
    fn signers_are_normalized() {
        let signers =
            validate_signers(&[signer(" Buyer ", " Dana Buyer ", "Dana@Example.com")]).unwrap();
        assert_eq!(signers[0].role, "buyer");
        assert_eq!(signers[0].name, "Dana Buyer");
        assert_eq!(signers[0].email, "dana@example.com");
    }

    #[test]
    fn signers_require_contact_details() {
        assert!(matches!(validate_signers(&[]), Err(SigningError::NoSigners)));
        assert!(matches!(
            validate_signers(&[signer("buyer", "Dana", "not-an-email")]),
            Err(SigningError::InvalidSigner(_))
        ));
        assert!(matches!(
            validate_signers(&[signer("", "Dana", "dana@example.com")]),
            Err(SigningError::InvalidSigner(_))
        ));
    }

    #[test]
    fn values_must_target_the_signers_fields() {
        let session = session("buyer");
        let mine = field("buyer");
        let theirs = field("seller");
        let fields = vec![mine.clone(), theirs.clone()];

        let ok = validate_values(
            &session,
            &fields,
            &[FieldValueInput {
                field_id: mine.id,
                value: "Dana".into(),
            }],
        )
        .unwrap();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].session_id, session.id);

        let wrong_role = validate_values(
            &session,
            &fields,
            &[FieldValueInput {
                field_id: theirs.id,
                value: "x".into(),
            }],
        );
        assert!(matches!(wrong_role, Err(SigningError::InvalidFieldValue(_))));

        let foreign = validate_values(
            &session,
            &fields,
            &[FieldValueInput {
                field_id: Uuid::new_v4(),
                value: "x".into(),
            }],
        );
        assert!(matches!(foreign, Err(SigningError::InvalidFieldValue(_))));
    }

    #[test]
    fn signing_errors_map_to_http_statuses() {
        use axum::http::StatusCode;

        assert_eq!(
            AppError::from(SigningError::AlreadySigned).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(SigningError::NoFieldsPlaced).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(SigningError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(SigningError::Parser(ParserError::Unavailable("down".into()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
