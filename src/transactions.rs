use std::fmt;

use chrono::{NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::error::AppError;
use crate::milestones::{self, plan_milestones, ContractFacts, FinancingType, ScheduleError};
use crate::models::{Milestone, NewParty, NewTransaction, Party, Transaction};
use crate::parser::{ParsedContract, ParsedParty};
use crate::schema::{milestones as milestones_table, parties, transactions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Draft,
    New,
    Active,
    PendingClosing,
    Closed,
    Cancelled,
}

pub const TRANSACTION_STATUSES: &[&str] = &[
    "draft",
    "new",
    "active",
    "pending_closing",
    "closed",
    "cancelled",
];

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Draft => "draft",
            TransactionStatus::New => "new",
            TransactionStatus::Active => "active",
            TransactionStatus::PendingClosing => "pending_closing",
            TransactionStatus::Closed => "closed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(TransactionStatus::Draft),
            "new" => Some(TransactionStatus::New),
            "active" => Some(TransactionStatus::Active),
            "pending_closing" => Some(TransactionStatus::PendingClosing),
            "closed" => Some(TransactionStatus::Closed),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses counted as live deals in summaries.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            TransactionStatus::New | TransactionStatus::Active | TransactionStatus::PendingClosing
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<IntakeError> for AppError {
    fn from(value: IntakeError) -> Self {
        match value {
            IntakeError::Schedule(err) => AppError::from(err),
            IntakeError::Database(err) => AppError::from(err),
        }
    }
}

/// Validated contract data for a transaction created with its full timeline.
#[derive(Debug, Clone)]
pub struct FullIntake {
    pub property_address: String,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub effective_date: NaiveDate,
    pub closing_date: NaiveDate,
    pub financing: Option<FinancingType>,
    pub initial_deposit_cents: Option<i64>,
    pub additional_deposit_cents: Option<i64>,
    pub initial_deposit_due: Option<NaiveDate>,
    pub additional_deposit_due: Option<NaiveDate>,
    pub parties: Vec<ParsedParty>,
}

impl FullIntake {
    pub fn facts(&self) -> ContractFacts {
        ContractFacts {
            effective_date: Some(self.effective_date),
            closing_date: Some(self.closing_date),
            initial_deposit_due: self.initial_deposit_due,
            additional_deposit_due: self.additional_deposit_due,
            additional_deposit_cents: self.additional_deposit_cents,
            financing: self.financing,
        }
    }
}

impl From<&ParsedContract> for FullIntake {
    fn from(parsed: &ParsedContract) -> Self {
        Self {
            property_address: parsed.property_address.clone(),
            buyer_name: parsed.buyer_name.clone(),
            seller_name: parsed.seller_name.clone(),
            purchase_price_cents: parsed.purchase_price_cents,
            effective_date: parsed.effective_date,
            closing_date: parsed.closing_date,
            financing: parsed.financing,
            initial_deposit_cents: parsed.initial_deposit_cents,
            additional_deposit_cents: parsed.additional_deposit_cents,
            initial_deposit_due: None,
            additional_deposit_due: None,
            parties: parsed.parties.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DraftIntake {
    pub property_address: Option<String>,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOptions {
    /// Milestones due before this date are stored as completed.
    pub completed_before: Option<NaiveDate>,
}

pub fn find_owned(
    conn: &mut PgConnection,
    user_id: Uuid,
    transaction_id: Uuid,
) -> QueryResult<Transaction> {
    transactions::table
        .filter(transactions::id.eq(transaction_id))
        .filter(transactions::user_id.eq(user_id))
        .first(conn)
}

pub fn list_owned(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<Transaction>> {
    transactions::table
        .filter(transactions::user_id.eq(user_id))
        .order(transactions::created_at.desc())
        .load(conn)
}

pub fn list_parties(conn: &mut PgConnection, transaction_id: Uuid) -> QueryResult<Vec<Party>> {
    parties::table
        .filter(parties::transaction_id.eq(transaction_id))
        .order(parties::created_at.asc())
        .load(conn)
}

/// Creates a transaction with parties and its milestone timeline. The plan is
/// computed before anything is written, so a bad date set writes nothing.
pub fn create_full(
    conn: &mut PgConnection,
    user_id: Uuid,
    intake: &FullIntake,
    seed: SeedOptions,
) -> Result<(Transaction, Vec<Milestone>), IntakeError> {
    let plan = plan_milestones(&intake.facts())?;

    conn.transaction(|conn| {
        let id = Uuid::new_v4();
        let row = NewTransaction {
            id,
            user_id,
            property_address: Some(intake.property_address.clone()),
            status: TransactionStatus::New.as_str().to_string(),
            buyer_name: intake.buyer_name.clone(),
            seller_name: intake.seller_name.clone(),
            purchase_price_cents: intake.purchase_price_cents,
            effective_date: Some(intake.effective_date),
            closing_date: Some(intake.closing_date),
            financing_type: intake.financing.map(|f| f.as_str().to_string()),
            initial_deposit_cents: intake.initial_deposit_cents,
            additional_deposit_cents: intake.additional_deposit_cents,
            initial_deposit_due: intake.initial_deposit_due,
            additional_deposit_due: intake.additional_deposit_due,
        };
        diesel::insert_into(transactions::table)
            .values(&row)
            .execute(conn)?;

        insert_parties(conn, &party_rows(id, intake))?;
        let milestones = milestones::insert_plan(conn, id, &plan, seed.completed_before)?;

        activity::record(
            conn,
            id,
            None,
            activity::TRANSACTION_CREATED,
            &format!("Transaction created for {}", intake.property_address),
        )?;

        let transaction: Transaction = transactions::table.find(id).first(conn)?;
        info!(
            transaction_id = %id,
            user_id = %user_id,
            milestone_count = milestones.len(),
            "created transaction"
        );
        Ok((transaction, milestones))
    })
}

pub fn create_draft(
    conn: &mut PgConnection,
    user_id: Uuid,
    intake: &DraftIntake,
) -> QueryResult<Transaction> {
    conn.transaction(|conn| {
        let id = Uuid::new_v4();
        let row = NewTransaction {
            id,
            user_id,
            property_address: intake.property_address.clone(),
            status: TransactionStatus::Draft.as_str().to_string(),
            buyer_name: intake.buyer_name.clone(),
            seller_name: intake.seller_name.clone(),
            purchase_price_cents: None,
            effective_date: None,
            closing_date: None,
            financing_type: None,
            initial_deposit_cents: None,
            additional_deposit_cents: None,
            initial_deposit_due: None,
            additional_deposit_due: None,
        };
        diesel::insert_into(transactions::table)
            .values(&row)
            .execute(conn)?;
        activity::record(
            conn,
            id,
            None,
            activity::TRANSACTION_CREATED,
            "Draft transaction created",
        )?;
        info!(transaction_id = %id, user_id = %user_id, "created draft transaction");
        transactions::table.find(id).first(conn)
    })
}

/// Fills a draft transaction from parsed contract data and generates its
/// timeline if it has none yet. Callers run this inside their own database
/// transaction.
pub fn populate_from_contract(
    conn: &mut PgConnection,
    transaction: &Transaction,
    parsed: &ParsedContract,
) -> Result<Transaction, IntakeError> {
    let intake = FullIntake::from(parsed);
    let plan = plan_milestones(&intake.facts())?;

    diesel::update(transactions::table.find(transaction.id))
        .set((
            transactions::property_address.eq(Some(intake.property_address.clone())),
            transactions::buyer_name.eq(intake
                .buyer_name
                .clone()
                .or_else(|| transaction.buyer_name.clone())),
            transactions::seller_name.eq(intake
                .seller_name
                .clone()
                .or_else(|| transaction.seller_name.clone())),
            transactions::purchase_price_cents.eq(intake.purchase_price_cents),
            transactions::effective_date.eq(Some(intake.effective_date)),
            transactions::closing_date.eq(Some(intake.closing_date)),
            transactions::financing_type.eq(intake.financing.map(|f| f.as_str())),
            transactions::initial_deposit_cents.eq(intake.initial_deposit_cents),
            transactions::additional_deposit_cents.eq(intake.additional_deposit_cents),
            transactions::status.eq(TransactionStatus::New.as_str()),
            transactions::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

    let existing = list_parties(conn, transaction.id)?;
    let fresh: Vec<NewParty> = party_rows(transaction.id, &intake)
        .into_iter()
        .filter(|candidate| {
            !existing
                .iter()
                .any(|party| party.role == candidate.role && party.name == candidate.name)
        })
        .collect();
    insert_parties(conn, &fresh)?;

    let has_timeline: bool = diesel::select(diesel::dsl::exists(
        milestones_table::table.filter(milestones_table::transaction_id.eq(transaction.id)),
    ))
    .get_result(conn)?;
    if !has_timeline {
        milestones::insert_plan(conn, transaction.id, &plan, None)?;
    }

    activity::record(
        conn,
        transaction.id,
        None,
        activity::TRANSACTION_POPULATED,
        &format!("Contract data extracted for {}", intake.property_address),
    )?;
    info!(transaction_id = %transaction.id, "populated transaction from contract");

    Ok(transactions::table.find(transaction.id).first(conn)?)
}

fn party_rows(transaction_id: Uuid, intake: &FullIntake) -> Vec<NewParty> {
    let mut rows: Vec<NewParty> = Vec::new();
    let mut push = |role: &str, name: &str, email: Option<String>| {
        let duplicate = rows
            .iter()
            .any(|row| row.role == role && row.name == name.trim());
        if !duplicate && !name.trim().is_empty() {
            rows.push(NewParty {
                id: Uuid::new_v4(),
                transaction_id,
                role: role.to_string(),
                name: name.trim().to_string(),
                email,
            });
        }
    };

    for party in &intake.parties {
        push(&party.role, &party.name, party.email.clone());
    }
    if let Some(name) = intake.buyer_name.as_deref() {
        push("buyer", name, None);
    }
    if let Some(name) = intake.seller_name.as_deref() {
        push("seller", name, None);
    }
    rows
}

fn insert_parties(conn: &mut PgConnection, rows: &[NewParty]) -> QueryResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(parties::table)
        .values(rows)
        .execute(conn)?;
    Ok(())
}
