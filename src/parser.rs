//! Contract extraction. The production implementation is a deterministic
//! stand-in; a real PDF extractor plugs in behind [`ContractParser`].

use std::path::Path;

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::milestones::FinancingType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub role: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub document_name: String,
    pub signers: Vec<SignerInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedParty {
    pub role: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedContract {
    pub property_address: String,
    pub buyer_name: Option<String>,
    pub seller_name: Option<String>,
    pub purchase_price_cents: Option<i64>,
    pub effective_date: NaiveDate,
    pub closing_date: NaiveDate,
    pub financing: Option<FinancingType>,
    pub initial_deposit_cents: Option<i64>,
    pub additional_deposit_cents: Option<i64>,
    pub parties: Vec<ParsedParty>,
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("contract could not be read: {0}")]
    Unreadable(String),
    #[error("contract parser unavailable: {0}")]
    Unavailable(String),
}

impl From<ParserError> for AppError {
    fn from(value: ParserError) -> Self {
        AppError::upstream(value)
    }
}

pub trait ContractParser: Send + Sync + 'static {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedContract, ParserError>;
}

const MOCK_PURCHASE_PRICE_CENTS: i64 = 450_000_00;
const MOCK_INITIAL_DEPOSIT_CENTS: i64 = 5_000_00;
const MOCK_ADDITIONAL_DEPOSIT_CENTS: i64 = 40_000_00;
const MOCK_CLOSING_DAYS: i64 = 50;
const MOCK_FALLBACK_ADDRESS: &str = "123 Main Street, Springfield, NJ 07081";

/// Returns plausible contract data without reading the file. Addresses come
/// from the document name when it starts with a street number.
#[derive(Debug, Clone, Default)]
pub struct MockContractParser {
    effective_date: Option<NaiveDate>,
}

impl MockContractParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_effective_date(effective_date: NaiveDate) -> Self {
        Self {
            effective_date: Some(effective_date),
        }
    }
}

impl ContractParser for MockContractParser {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedContract, ParserError> {
        let stem = Path::new(&request.document_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.replace(['_', '-'], " "))
            .unwrap_or_default();
        let stem = stem.trim();
        let property_address = if stem.starts_with(|ch: char| ch.is_ascii_digit()) {
            stem.to_string()
        } else {
            MOCK_FALLBACK_ADDRESS.to_string()
        };

        let first_named = |role: &str| {
            request
                .signers
                .iter()
                .find(|signer| signer.role.eq_ignore_ascii_case(role))
                .map(|signer| signer.name.clone())
        };

        let effective_date = self
            .effective_date
            .unwrap_or_else(|| Utc::now().date_naive());

        Ok(ParsedContract {
            property_address,
            buyer_name: first_named("buyer"),
            seller_name: first_named("seller"),
            purchase_price_cents: Some(MOCK_PURCHASE_PRICE_CENTS),
            effective_date,
            closing_date: effective_date + Duration::days(MOCK_CLOSING_DAYS),
            financing: Some(FinancingType::Conventional),
            initial_deposit_cents: Some(MOCK_INITIAL_DEPOSIT_CENTS),
            additional_deposit_cents: Some(MOCK_ADDITIONAL_DEPOSIT_CENTS),
            parties: request
                .signers
                .iter()
                .map(|signer| ParsedParty {
                    role: signer.role.to_ascii_lowercase(),
                    name: signer.name.clone(),
                    email: Some(signer.email.clone()),
                })
                .collect(),
        })
    }
}
