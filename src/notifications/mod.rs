use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod preferences;
pub mod reminders;
pub mod templates;
pub mod transport;

pub use transport::{HttpMailTransport, LogTransport};

pub const DEFAULT_REMINDER_LEAD_DAYS: i32 = 3;
pub const MAX_REMINDER_LEAD_DAYS: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateId {
    DeadlineReminder,
    OverdueAlert,
    WeeklyDigest,
}

impl TemplateId {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateId::DeadlineReminder => "deadline_reminder",
            TemplateId::OverdueAlert => "overdue_alert",
            TemplateId::WeeklyDigest => "weekly_digest",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationContent {
    Template { template: TemplateId, data: Value },
    Raw { subject: String, body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub to: String,
    pub content: NotificationContent,
}

impl Notification {
    pub fn template(to: impl Into<String>, template: TemplateId, data: Value) -> Self {
        Self {
            to: to.into(),
            content: NotificationContent::Template { template, data },
        }
    }

    pub fn raw(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            content: NotificationContent::Raw {
                subject: subject.into(),
                body: body.into(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mail service rejected message: {0}")]
    Rejected(String),
    #[error("mail service unreachable: {0}")]
    Unreachable(String),
    #[error(transparent)]
    Template(#[from] templates::TemplateError),
}

#[async_trait]
pub trait NotificationTransport: Send + Sync + 'static {
    async fn send(&self, notification: &Notification) -> Result<(), TransportError>;
}

/// Per-recipient delivery result. Failures carry the transport's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed(String),
}
