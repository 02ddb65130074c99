use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::documents::{read_upload, to_document_response, DocumentResponse};
use super::milestones::{to_milestone_responses, MilestoneResponse};
use crate::activity;
use crate::auth::AuthenticatedUser;
use crate::documents::{self, DocumentStatus, StoredUpload};
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::milestones::{self, FinancingType};
use crate::models::{ActivityEntry, Party, Transaction};
use crate::parser::{ParseRequest, ParsedParty};
use crate::schema::transactions as transactions_table;
use crate::state::AppState;
use crate::transactions::{
    self, DraftIntake, FullIntake, SeedOptions, TransactionStatus, TRANSACTION_STATUSES,
};

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
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

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            property_address: tx.property_address,
            status: tx.status,
            buyer_name: tx.buyer_name,
            seller_name: tx.seller_name,
            purchase_price_cents: tx.purchase_price_cents,
            effective_date: tx.effective_date,
            closing_date: tx.closing_date,
            financing_type: tx.financing_type,
            initial_deposit_cents: tx.initial_deposit_cents,
            additional_deposit_cents: tx.additional_deposit_cents,
            initial_deposit_due: tx.initial_deposit_due,
            additional_deposit_due: tx.additional_deposit_due,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct PartyResponse {
    pub id: Uuid,
    pub role: String,
    pub name: String,
    pub email: Option<String>,
}

impl From<Party> for PartyResponse {
    fn from(party: Party) -> Self {
        Self {
            id: party.id,
            role: party.role,
            name: party.name,
            email: party.email,
        }
    }
}

#[derive(Serialize)]
pub struct TransactionDetailResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub milestones: Vec<MilestoneResponse>,
    pub parties: Vec<PartyResponse>,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub document_id: Option<Uuid>,
    pub action: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

impl From<ActivityEntry> for ActivityResponse {
    fn from(entry: ActivityEntry) -> Self {
        Self {
            id: entry.id,
            document_id: entry.document_id,
            action: entry.action,
            description: entry.description,
            created_at: entry.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct PartyInput {
    pub role: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub property_address: String,
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
    #[serde(default)]
    pub parties: Vec<PartyInput>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn non_negative(name: &str, value: Option<i64>) -> AppResult<Option<i64>> {
    match value {
        Some(cents) if cents < 0 => Err(AppError::bad_request(format!("{name} must not be negative"))),
        other => Ok(other),
    }
}

impl CreateTransactionRequest {
    fn validate(self) -> AppResult<FullIntake> {
        let property_address = clean(Some(self.property_address))
            .ok_or_else(|| AppError::bad_request("property_address is required"))?;
        let effective_date = self
            .effective_date
            .ok_or_else(|| AppError::bad_request("effective_date is required"))?;
        let closing_date = self
            .closing_date
            .ok_or_else(|| AppError::bad_request("closing_date is required"))?;
        let financing = match clean(self.financing_type) {
            Some(value) => Some(FinancingType::parse(&value.to_lowercase()).ok_or_else(|| {
                AppError::bad_request(format!(
                    "financing_type must be one of cash, conventional, fha, va (got '{value}')"
                ))
            })?),
            None => None,
        };

        let parties = self
            .parties
            .into_iter()
            .map(|party| {
                let role = party.role.trim().to_lowercase();
                let name = party.name.trim().to_string();
                if role.is_empty() || name.is_empty() {
                    return Err(AppError::bad_request("each party needs a role and a name"));
                }
                Ok(ParsedParty {
                    role,
                    name,
                    email: clean(party.email).map(|email| email.to_lowercase()),
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(FullIntake {
            property_address,
            buyer_name: clean(self.buyer_name),
            seller_name: clean(self.seller_name),
            purchase_price_cents: non_negative("purchase_price_cents", self.purchase_price_cents)?,
            effective_date,
            closing_date,
            financing,
            initial_deposit_cents: non_negative("initial_deposit_cents", self.initial_deposit_cents)?,
            additional_deposit_cents: non_negative(
                "additional_deposit_cents",
                self.additional_deposit_cents,
            )?,
            initial_deposit_due: self.initial_deposit_due,
            additional_deposit_due: self.additional_deposit_due,
            parties,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct CreateDraftRequest {
    pub property_address: Option<String>,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTransactionRequest {
    pub status: Option<String>,
    pub property_address: Option<String>,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub purchase_price_cents: Option<i64>,
}

#[derive(AsChangeset)]
#[diesel(table_name = transactions_table)]
struct TransactionChangeset {
    status: Option<String>,
    property_address: Option<Option<String>>,
    buyer_name: Option<Option<String>>,
    seller_name: Option<Option<String>>,
    purchase_price_cents: Option<Option<i64>>,
    updated_at: NaiveDateTime,
}

fn load_detail(
    conn: &mut PgConnection,
    transaction: Transaction,
) -> AppResult<TransactionDetailResponse> {
    let milestones = milestones::list_for_transaction(conn, transaction.id)?;
    let parties = transactions::list_parties(conn, transaction.id)?;
    let documents = documents::list_for_transaction(conn, transaction.id)?;
    Ok(TransactionDetailResponse {
        transaction: transaction.into(),
        milestones: to_milestone_responses(milestones),
        parties: parties.into_iter().map(PartyResponse::from).collect(),
        documents: documents.into_iter().map(to_document_response).collect(),
    })
}

pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TransactionResponse>>> {
    let mut conn = state.db()?;
    let rows = transactions::list_owned(&mut conn, user.user_id)?;
    Ok(Json(rows.into_iter().map(TransactionResponse::from).collect()))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(payload): AppJson<CreateTransactionRequest>,
) -> AppResult<(StatusCode, Json<TransactionDetailResponse>)> {
    let intake = payload.validate()?;
    let mut conn = state.db()?;
    let (transaction, _) =
        transactions::create_full(&mut conn, user.user_id, &intake, SeedOptions::default())?;
    Ok((StatusCode::CREATED, Json(load_detail(&mut conn, transaction)?)))
}

pub async fn create_draft_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<CreateDraftRequest>>,
) -> AppResult<(StatusCode, Json<TransactionDetailResponse>)> {
    let Json(payload) = payload.unwrap_or_default();
    let intake = DraftIntake {
        property_address: clean(payload.property_address),
        buyer_name: clean(payload.buyer_name),
        seller_name: clean(payload.seller_name),
    };
    let mut conn = state.db()?;
    let transaction = transactions::create_draft(&mut conn, user.user_id, &intake)?;
    Ok((StatusCode::CREATED, Json(load_detail(&mut conn, transaction)?)))
}

/// Contract upload: parse the file, build the transaction from the extracted
/// terms and keep the file as an already-parsed document.
pub async fn intake_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<TransactionDetailResponse>)> {
    let upload = read_upload(multipart).await?;

    let parsed = state.parser.parse(&ParseRequest {
        document_name: upload.file_name.clone(),
        signers: Vec::new(),
    })?;
    let intake = FullIntake::from(&parsed);

    let transaction = {
        let mut conn = state.db()?;
        let (transaction, _) =
            transactions::create_full(&mut conn, user.user_id, &intake, SeedOptions::default())?;
        transaction
    };

    let stored = StoredUpload::describe(
        transaction.id,
        &upload.file_name,
        upload.content_type.clone(),
        &upload.bytes,
    );
    if let Err(err) = state
        .storage
        .put_object(&stored.storage_key, upload.bytes, stored.content_type.clone())
        .await
    {
        error!(error = ?err, transaction_id = %transaction.id, "contract upload failed; rolling back intake");
        let mut conn = state.db()?;
        diesel::delete(transactions_table::table.find(transaction.id)).execute(&mut conn)?;
        return Err(AppError::upstream(err));
    }

    let mut conn = state.db()?;
    documents::insert_upload(&mut conn, transaction.id, &stored, DocumentStatus::Parsed)?;
    info!(
        transaction_id = %transaction.id,
        file_name = %upload.file_name,
        "created transaction from contract upload"
    );
    Ok((StatusCode::CREATED, Json(load_detail(&mut conn, transaction)?)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<TransactionDetailResponse>> {
    let mut conn = state.db()?;
    let transaction = transactions::find_owned(&mut conn, user.user_id, transaction_id)?;
    Ok(Json(load_detail(&mut conn, transaction)?))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateTransactionRequest>,
) -> AppResult<Json<TransactionDetailResponse>> {
    let status = match payload.status.as_deref() {
        Some(value) => Some(TransactionStatus::parse(value.trim()).ok_or_else(|| {
            AppError::bad_request(format!(
                "invalid status '{value}'. Allowed statuses: {}",
                TRANSACTION_STATUSES.join(", ")
            ))
        })?),
        None => None,
    };
    let price = non_negative("purchase_price_cents", payload.purchase_price_cents)?;

    let mut conn = state.db()?;
    let transaction = conn.transaction(|conn| -> AppResult<Transaction> {
        let current = transactions_table::table
            .filter(transactions_table::id.eq(transaction_id))
            .filter(transactions_table::user_id.eq(user.user_id))
            .for_update()
            .first::<Transaction>(conn)?;

        let changeset = TransactionChangeset {
            status: status.map(|status| status.as_str().to_string()),
            property_address: payload.property_address.map(|v| clean(Some(v))),
            buyer_name: payload.buyer_name.map(|v| clean(Some(v))),
            seller_name: payload.seller_name.map(|v| clean(Some(v))),
            purchase_price_cents: price.map(Some),
            updated_at: Utc::now().naive_utc(),
        };
        let updated: Transaction = diesel::update(transactions_table::table.find(transaction_id))
            .set(&changeset)
            .get_result(conn)?;

        if updated.status != current.status {
            activity::record(
                conn,
                transaction_id,
                None,
                activity::TRANSACTION_STATUS_CHANGED,
                &format!("Transaction moved from {} to {}", current.status, updated.status),
            )?;
            info!(
                transaction_id = %transaction_id,
                from = %current.status,
                to = %updated.status,
                "transaction status changed"
            );
        }
        Ok(updated)
    })?;

    Ok(Json(load_detail(&mut conn, transaction)?))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let keys = {
        let mut conn = state.db()?;
        let transaction = transactions::find_owned(&mut conn, user.user_id, transaction_id)?;
        let keys: Vec<String> = documents::list_for_transaction(&mut conn, transaction.id)?
            .into_iter()
            .map(|doc| doc.storage_key)
            .collect();
        diesel::delete(transactions_table::table.find(transaction.id)).execute(&mut conn)?;
        keys
    };

    for key in keys {
        if let Err(err) = state.storage.delete_object(&key).await {
            warn!(error = ?err, storage_key = %key, "failed to delete stored document");
        }
    }
    info!(transaction_id = %transaction_id, "deleted transaction");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<Uuid>,
) -> AppResult<Json<Vec<ActivityResponse>>> {
    let mut conn = state.db()?;
    transactions::find_owned(&mut conn, user.user_id, transaction_id)?;
    let entries = activity::list_for_transaction(&mut conn, transaction_id)?;
    Ok(Json(entries.into_iter().map(ActivityResponse::from).collect()))
}
