//! Public signing link. The token in the path is the only credential.

use std::time::Duration;

use axum::extract::{Json, Path, State};
use axum::response::Redirect;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::documents::{FieldResponse, PRESIGNED_URL_EXPIRY_SECONDS};
use crate::documents::inline_content_disposition;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::signing::{self, FieldValueInput};
use crate::state::AppState;

#[derive(Serialize)]
pub struct SignerView {
    pub signer_name: String,
    pub signer_role: String,
    pub status: String,
    pub signed_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct SigningDocumentView {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub content_type: Option<String>,
}

#[derive(Serialize)]
pub struct CapturedValue {
    pub field_id: Uuid,
    pub value: String,
}

#[derive(Serialize)]
pub struct SigningView {
    pub session: SignerView,
    pub document: SigningDocumentView,
    pub fields: Vec<FieldResponse>,
    pub values: Vec<CapturedValue>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub field_values: Vec<FieldValueInput>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub signed_at: Option<NaiveDateTime>,
    pub remaining_signers: i64,
    pub document_status: String,
    pub transaction_populated: bool,
}

pub async fn view_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SigningView>> {
    let mut conn = state.db()?;
    let resolved = signing::resolve_by_token(&mut conn, &token)?;

    Ok(Json(SigningView {
        session: SignerView {
            signer_name: resolved.session.signer_name,
            signer_role: resolved.session.signer_role,
            status: resolved.session.status,
            signed_at: resolved.session.signed_at,
        },
        document: SigningDocumentView {
            id: resolved.document.id,
            name: resolved.document.name,
            status: resolved.document.status,
            content_type: resolved.document.content_type,
        },
        fields: resolved.fields.into_iter().map(FieldResponse::from).collect(),
        values: resolved
            .values
            .into_iter()
            .map(|value| CapturedValue {
                field_id: value.field_id,
                value: value.value,
            })
            .collect(),
    }))
}

pub async fn submit_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    AppJson(payload): AppJson<SubmitRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let mut conn = state.db()?;
    let outcome = signing::complete_session(
        &mut conn,
        state.parser.as_ref(),
        &token,
        &payload.field_values,
    )?;

    Ok(Json(SubmitResponse {
        status: outcome.session.status,
        signed_at: outcome.session.signed_at,
        remaining_signers: outcome.remaining,
        document_status: outcome.document_status.as_str().to_string(),
        transaction_populated: outcome.transaction_populated,
    }))
}

pub async fn session_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Redirect> {
    let document = {
        let mut conn = state.db()?;
        signing::document_for_token(&mut conn, &token)?
    };

    let url = state
        .storage
        .presign_get_object(
            &document.storage_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
            inline_content_disposition(&document.name),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;
    Ok(Redirect::temporary(&url))
}
