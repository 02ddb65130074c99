//! Derives a transaction's milestone timeline from contract dates.
//!
//! Every due date is anchored either to the effective date (a fixed number of
//! days after it) or to the closing date (a fixed number of days before it),
//! then clamped into `[effective_date, closing_date]`. The resulting plan is
//! ordered by due date, ties broken by the logical order of the rules below.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::MilestoneKind;

pub const ATTORNEY_REVIEW_DAYS: i64 = 3;
pub const INITIAL_DEPOSIT_DAYS: i64 = 5;
pub const INSPECTION_DAYS: i64 = 10;
pub const ADDITIONAL_DEPOSIT_DAYS: i64 = 10;
pub const APPRAISAL_DAYS: i64 = 21;
pub const LOAN_APPROVAL_DAYS: i64 = 30;
/// Loan approval is never later than this many days before closing.
pub const LOAN_APPROVAL_CLOSING_BUFFER_DAYS: i64 = 7;
pub const TITLE_DAYS_BEFORE_CLOSING: i64 = 14;
pub const WALKTHROUGH_DAYS_BEFORE_CLOSING: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingType {
    Cash,
    Conventional,
    Fha,
    Va,
}

impl FinancingType {
    pub fn as_str(self) -> &'static str {
        match self {
            FinancingType::Cash => "cash",
            FinancingType::Conventional => "conventional",
            FinancingType::Fha => "fha",
            FinancingType::Va => "va",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(FinancingType::Cash),
            "conventional" => Some(FinancingType::Conventional),
            "fha" => Some(FinancingType::Fha),
            "va" => Some(FinancingType::Va),
            _ => None,
        }
    }

    pub fn is_financed(self) -> bool {
        !matches!(self, FinancingType::Cash)
    }
}

/// The subset of a contract the scheduler reads.
#[derive(Debug, Clone, Default)]
pub struct ContractFacts {
    pub effective_date: Option<NaiveDate>,
    pub closing_date: Option<NaiveDate>,
    pub initial_deposit_due: Option<NaiveDate>,
    pub additional_deposit_due: Option<NaiveDate>,
    pub additional_deposit_cents: Option<i64>,
    /// `None` is scheduled like a financed purchase.
    pub financing: Option<FinancingType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMilestone {
    pub kind: MilestoneKind,
    pub name: &'static str,
    pub due_date: NaiveDate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("effective date is required to build a timeline")]
    MissingEffectiveDate,
    #[error("closing date is required to build a timeline")]
    MissingClosingDate,
    #[error("closing date {closing} precedes effective date {effective}")]
    ClosingBeforeEffective {
        effective: NaiveDate,
        closing: NaiveDate,
    },
}

enum DueRule {
    AfterEffective(i64),
    BeforeClosing(i64),
    Explicit(NaiveDate),
    LoanApproval,
}

struct Rule {
    kind: MilestoneKind,
    name: &'static str,
    due: DueRule,
}

pub fn plan_milestones(facts: &ContractFacts) -> Result<Vec<PlannedMilestone>, ScheduleError> {
    let effective = facts
        .effective_date
        .ok_or(ScheduleError::MissingEffectiveDate)?;
    let closing = facts.closing_date.ok_or(ScheduleError::MissingClosingDate)?;
    if closing < effective {
        return Err(ScheduleError::ClosingBeforeEffective { effective, closing });
    }

    let financed = facts.financing.map_or(true, FinancingType::is_financed);
    let has_additional_deposit = facts.additional_deposit_due.is_some()
        || facts.additional_deposit_cents.is_some_and(|cents| cents > 0);

    let mut rules = vec![
        Rule {
            kind: MilestoneKind::AttorneyReview,
            name: "Attorney Review Ends",
            due: DueRule::AfterEffective(ATTORNEY_REVIEW_DAYS),
        },
        Rule {
            kind: MilestoneKind::Deposit,
            name: "Initial Deposit Due",
            due: facts
                .initial_deposit_due
                .map_or(DueRule::AfterEffective(INITIAL_DEPOSIT_DAYS), DueRule::Explicit),
        },
        Rule {
            kind: MilestoneKind::Inspection,
            name: "Home Inspection",
            due: DueRule::AfterEffective(INSPECTION_DAYS),
        },
    ];

    if has_additional_deposit {
        rules.push(Rule {
            kind: MilestoneKind::Deposit,
            name: "Additional Deposit Due",
            due: facts.additional_deposit_due.map_or(
                DueRule::AfterEffective(ADDITIONAL_DEPOSIT_DAYS),
                DueRule::Explicit,
            ),
        });
    }

    if financed {
        rules.push(Rule {
            kind: MilestoneKind::Appraisal,
            name: "Appraisal",
            due: DueRule::AfterEffective(APPRAISAL_DAYS),
        });
        rules.push(Rule {
            kind: MilestoneKind::LoanApproval,
            name: "Mortgage Commitment",
            due: DueRule::LoanApproval,
        });
    }

    rules.extend([
        Rule {
            kind: MilestoneKind::Title,
            name: "Title Search Complete",
            due: DueRule::BeforeClosing(TITLE_DAYS_BEFORE_CLOSING),
        },
        Rule {
            kind: MilestoneKind::Other,
            name: "Final Walk-Through",
            due: DueRule::BeforeClosing(WALKTHROUGH_DAYS_BEFORE_CLOSING),
        },
        Rule {
            kind: MilestoneKind::Closing,
            name: "Closing",
            due: DueRule::BeforeClosing(0),
        },
    ]);

    let mut planned: Vec<PlannedMilestone> = rules
        .into_iter()
        .map(|rule| {
            let raw = match rule.due {
                DueRule::AfterEffective(days) => effective + Duration::days(days),
                DueRule::BeforeClosing(days) => closing - Duration::days(days),
                DueRule::Explicit(date) => date,
                DueRule::LoanApproval => std::cmp::min(
                    effective + Duration::days(LOAN_APPROVAL_DAYS),
                    closing - Duration::days(LOAN_APPROVAL_CLOSING_BUFFER_DAYS),
                ),
            };
            PlannedMilestone {
                kind: rule.kind,
                name: rule.name,
                due_date: raw.clamp(effective, closing),
            }
        })
        .collect();

    // stable: equal dates keep rule order, so closing stays last
    planned.sort_by_key(|milestone| milestone.due_date);
    Ok(planned)
}
