use std::time::Duration;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::documents::{self, fields, DocumentStatus, StoredUpload};
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::models::{Document, DocumentField, SigningSession};
use crate::notifications::{DeliveryStatus, Notification};
use crate::schema::documents as documents_table;
use crate::signing::{self, SignerInput};
use crate::state::AppState;
use crate::transactions;

pub const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub fn to_document_response(doc: Document) -> DocumentResponse {
    DocumentResponse {
        id: doc.id,
        transaction_id: doc.transaction_id,
        name: doc.name,
        content_type: doc.content_type,
        size_bytes: doc.size_bytes,
        checksum: doc.checksum,
        status: doc.status,
        created_at: doc.created_at,
        updated_at: doc.updated_at,
    }
}

#[derive(Serialize)]
pub struct FieldResponse {
    pub id: Uuid,
    pub page_number: i32,
    pub field_type: String,
    pub assignee_role: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<DocumentField> for FieldResponse {
    fn from(field: DocumentField) -> Self {
        Self {
            id: field.id,
            page_number: field.page_number,
            field_type: field.field_type,
            assignee_role: field.assignee_role,
            x: field.x,
            y: field.y,
            width: field.width,
            height: field.height,
        }
    }
}

/// Session as the document owner sees it. The token is never echoed back.
#[derive(Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub signer_role: String,
    pub signer_name: String,
    pub signer_email: String,
    pub status: String,
    pub signed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl From<SigningSession> for SessionResponse {
    fn from(session: SigningSession) -> Self {
        Self {
            id: session.id,
            signer_role: session.signer_role,
            signer_name: session.signer_name,
            signer_email: session.signer_email,
            status: session.status,
            signed_at: session.signed_at,
            created_at: session.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    pub fields: Vec<FieldResponse>,
    pub sessions: Vec<SessionResponse>,
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}

#[derive(Deserialize)]
pub struct ReplaceFieldsRequest {
    pub fields: Vec<fields::FieldInput>,
}

#[derive(Deserialize)]
pub struct CreateSessionsRequest {
    pub signers: Vec<SignerInput>,
}

#[derive(Serialize)]
pub struct InvitationResult {
    pub session_id: Uuid,
    pub signer_email: String,
    #[serde(flatten)]
    pub delivery: DeliveryStatus,
}

#[derive(Serialize)]
pub struct CreatedSession {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub signing_url: String,
}

#[derive(Serialize)]
pub struct CreateSessionsResponse {
    pub sessions: Vec<CreatedSession>,
    pub invitations: Vec<InvitationResult>,
}

/// A file read from a multipart body's `file` part.
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub async fn read_upload(mut multipart: Multipart) -> AppResult<UploadedFile> {
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::bad_request("filename is required"))?;
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;
        file = Some(UploadedFile {
            file_name,
            content_type,
            bytes: data.to_vec(),
        });
    }

    let file = file.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if file.bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    Ok(file)
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;
    transactions::find_owned(&mut conn, user.user_id, transaction_id)?;
    let rows = documents::list_for_transaction(&mut conn, transaction_id)?;
    Ok(Json(rows.into_iter().map(to_document_response).collect()))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    {
        let mut conn = state.db()?;
        transactions::find_owned(&mut conn, user.user_id, transaction_id)?;
    }

    let upload = read_upload(multipart).await?;
    let stored = StoredUpload::describe(
        transaction_id,
        &upload.file_name,
        upload.content_type,
        &upload.bytes,
    );
    state
        .storage
        .put_object(&stored.storage_key, upload.bytes, stored.content_type.clone())
        .await
        .map_err(|err| {
            error!(error = ?err, transaction_id = %transaction_id, "document upload failed");
            AppError::upstream(err)
        })?;

    let mut conn = state.db()?;
    let document = documents::insert_upload(&mut conn, transaction_id, &stored, DocumentStatus::Draft)?;
    Ok((StatusCode::CREATED, Json(to_document_response(document))))
}

pub async fn get_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentDetailResponse>> {
    let mut conn = state.db()?;
    let (document, _) = documents::find_owned(&mut conn, user.user_id, document_id)?;
    let placed = fields::list_fields(&mut conn, document.id)?;
    let sessions = signing::list_sessions(&mut conn, document.id)?;
    Ok(Json(DocumentDetailResponse {
        document: to_document_response(document),
        fields: placed.into_iter().map(FieldResponse::from).collect(),
        sessions: sessions.into_iter().map(SessionResponse::from).collect(),
    }))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = {
        let mut conn = state.db()?;
        documents::find_owned(&mut conn, user.user_id, document_id)?.0
    };

    let url = state
        .storage
        .presign_get_object(
            &document.storage_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
            documents::inline_content_disposition(&document.name),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(DocumentDownloadResponse {
        url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        filename: document.name,
        content_type: document.content_type,
        size_bytes: document.size_bytes,
    }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let document = {
        let mut conn = state.db()?;
        let (document, _) = documents::find_owned(&mut conn, user.user_id, document_id)?;
        diesel::delete(documents_table::table.find(document.id)).execute(&mut conn)?;
        document
    };

    if let Err(err) = state.storage.delete_object(&document.storage_key).await {
        warn!(error = ?err, document_id = %document.id, "failed to delete stored file");
    }
    info!(document_id = %document.id, "deleted document");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_fields(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<FieldResponse>>> {
    let mut conn = state.db()?;
    let (document, _) = documents::find_owned(&mut conn, user.user_id, document_id)?;
    let placed = fields::list_fields(&mut conn, document.id)?;
    Ok(Json(placed.into_iter().map(FieldResponse::from).collect()))
}

/// Replaces the whole field set. Only drafts can be edited; once sessions
/// exist the fields are what signers were asked to fill.
pub async fn replace_fields(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    AppJson(payload): AppJson<ReplaceFieldsRequest>,
) -> AppResult<Json<Vec<FieldResponse>>> {
    let mut conn = state.db()?;
    let (document, _) = documents::find_owned(&mut conn, user.user_id, document_id)?;
    if DocumentStatus::parse(&document.status) != Some(DocumentStatus::Draft) {
        return Err(AppError::conflict(format!(
            "fields cannot be changed once a document is {}",
            document.status
        )));
    }
    let placed = fields::replace_fields(&mut conn, document.id, &payload.fields)?;
    Ok(Json(placed.into_iter().map(FieldResponse::from).collect()))
}

pub async fn list_signing_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<SessionResponse>>> {
    let mut conn = state.db()?;
    let (document, _) = documents::find_owned(&mut conn, user.user_id, document_id)?;
    let sessions = signing::list_sessions(&mut conn, document.id)?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

fn invitation(state: &AppState, document: &Document, address: Option<&str>, session: &SigningSession) -> Notification {
    let link = state.config.signing_link(&session.token);
    let property = address.unwrap_or("your transaction");
    Notification::raw(
        session.signer_email.clone(),
        format!("Signature requested: {}", document.name),
        format!(
            "Hi {},\n\nYou have been asked to sign \"{}\" for {} as the {}.\n\nOpen this link to review and sign:\n{}\n\nThe link is personal to you; do not forward it.\n",
            session.signer_name, document.name, property, session.signer_role, link
        ),
    )
}

pub async fn create_signing_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    AppJson(payload): AppJson<CreateSessionsRequest>,
) -> AppResult<(StatusCode, Json<CreateSessionsResponse>)> {
    let (document, transaction, sessions) = {
        let mut conn = state.db()?;
        let (document, transaction) = documents::find_owned(&mut conn, user.user_id, document_id)?;
        let sessions = signing::create_sessions(&mut conn, &document, &payload.signers)?;
        (document, transaction, sessions)
    };

    let mut invitations = Vec::with_capacity(sessions.len());
    for session in &sessions {
        let message = invitation(&state, &document, transaction.property_address.as_deref(), session);
        let delivery = match state.mailer.send(&message).await {
            Ok(()) => DeliveryStatus::Sent,
            Err(err) => {
                warn!(
                    document_id = %document.id,
                    session_id = %session.id,
                    error = %err,
                    "signing invitation failed"
                );
                DeliveryStatus::Failed(err.to_string())
            }
        };
        invitations.push(InvitationResult {
            session_id: session.id,
            signer_email: session.signer_email.clone(),
            delivery,
        });
    }

    let sessions = sessions
        .into_iter()
        .map(|session| CreatedSession {
            signing_url: state.config.signing_link(&session.token),
            session: session.into(),
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionsResponse {
            sessions,
            invitations,
        }),
    ))
}
