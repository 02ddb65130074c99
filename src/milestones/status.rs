use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    Completed,
    Overdue,
    Waived,
}

pub const MILESTONE_STATUSES: &[&str] = &["pending", "completed", "overdue", "waived"];

/// Stored values that still count as outstanding work. `overdue` only shows
/// up in rows written before it stopped being accepted as an update.
pub const OUTSTANDING_STATUSES: [&str; 2] = ["pending", "overdue"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid milestone status '{0}'. Allowed statuses: pending, completed, overdue, waived")]
    UnknownStatus(String),
    #[error("overdue is derived from the due date and cannot be set")]
    Derived,
    #[error("milestone is already {0} and cannot change")]
    Terminal(MilestoneStatus),
    #[error("cannot move milestone from {from} to {to}")]
    NotAllowed {
        from: MilestoneStatus,
        to: MilestoneStatus,
    },
}

impl MilestoneStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Overdue => "overdue",
            MilestoneStatus::Waived => "waived",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MilestoneStatus::Completed | MilestoneStatus::Waived)
    }

    pub fn is_outstanding(self) -> bool {
        matches!(self, MilestoneStatus::Pending | MilestoneStatus::Overdue)
    }

    /// Checks a stored-status change. Re-asserting `pending` on a pending
    /// milestone is a no-op; every move out of `completed` or `waived` fails,
    /// and `overdue` is never a valid target.
    pub fn transition(self, target: MilestoneStatus) -> Result<MilestoneStatus, TransitionError> {
        use MilestoneStatus::*;

        if self.is_terminal() {
            return Err(TransitionError::Terminal(self));
        }

        match (self, target) {
            (_, Overdue) => Err(TransitionError::Derived),
            (Pending, Pending) => Ok(Pending),
            (Pending, Completed | Waived) => Ok(target),
            (Overdue, Completed | Waived) => Ok(target),
            (from, to) => Err(TransitionError::NotAllowed { from, to }),
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilestoneStatus {
    type Err = TransitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(MilestoneStatus::Pending),
            "completed" => Ok(MilestoneStatus::Completed),
            "overdue" => Ok(MilestoneStatus::Overdue),
            "waived" => Ok(MilestoneStatus::Waived),
            _ => Err(TransitionError::UnknownStatus(value.to_string())),
        }
    }
}

/// Status shown to users, computed from the due date. An outstanding
/// milestone reads as overdue once its due date has passed and as pending
/// before that; the stored value is left untouched.
pub fn display_status(stored: MilestoneStatus, due_date: NaiveDate, today: NaiveDate) -> MilestoneStatus {
    if !stored.is_outstanding() {
        stored
    } else if due_date < today {
        MilestoneStatus::Overdue
    } else {
        MilestoneStatus::Pending
    }
}

pub fn is_overdue(stored: MilestoneStatus, due_date: NaiveDate, today: NaiveDate) -> bool {
    display_status(stored, due_date, today) == MilestoneStatus::Overdue
}

#[cfg(test)]
mod tests {
    use super::*;
    use MilestoneStatus::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn pending_moves_to_any_resolution() {
        assert_eq!(Pending.transition(Completed), Ok(Completed));
        assert_eq!(Pending.transition(Waived), Ok(Waived));
        assert_eq!(Pending.transition(Pending), Ok(Pending));
    }

    #[test]
    fn overdue_cannot_be_set() {
        assert_eq!(Pending.transition(Overdue), Err(TransitionError::Derived));
        assert_eq!(Overdue.transition(Overdue), Err(TransitionError::Derived));
    }

    #[test]
    fn completed_and_waived_are_terminal() {
        for terminal in [Completed, Waived] {
            for target in [Pending, Completed, Overdue, Waived] {
                assert_eq!(
                    terminal.transition(target),
                    Err(TransitionError::Terminal(terminal))
                );
            }
        }
    }

    #[test]
    fn overdue_cannot_return_to_pending() {
        assert_eq!(Overdue.transition(Completed), Ok(Completed));
        assert!(matches!(
            Overdue.transition(Pending),
            Err(TransitionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!("Completed".parse::<MilestoneStatus>(), Ok(Completed));
        assert_eq!(
            "done".parse::<MilestoneStatus>(),
            Err(TransitionError::UnknownStatus("done".into()))
        );
    }

    #[test]
    fn overdue_is_derived_from_due_date() {
        let today = date(2026, 2, 10);
        assert_eq!(display_status(Pending, date(2026, 2, 9), today), Overdue);
        assert_eq!(display_status(Pending, date(2026, 2, 10), today), Pending);
        assert_eq!(display_status(Completed, date(2026, 2, 1), today), Completed);
        assert!(!is_overdue(Waived, date(2026, 1, 1), today));
    }

    #[test]
    fn stored_overdue_follows_the_due_date() {
        let today = date(2026, 2, 10);
        assert_eq!(display_status(Overdue, date(2026, 2, 1), today), Overdue);
        assert_eq!(display_status(Overdue, date(2026, 2, 20), today), Pending);
    }
}
