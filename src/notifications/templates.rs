use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::TemplateId;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("invalid {template} payload: {source}")]
    Payload {
        template: TemplateId,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestonePayload {
    pub recipient_name: String,
    pub milestone_name: String,
    pub property_address: String,
    pub due_date: NaiveDate,
    /// Positive for upcoming deadlines, negative once overdue.
    pub days_until_due: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DigestItem {
    pub milestone_name: String,
    pub property_address: String,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DigestPayload {
    pub recipient_name: String,
    pub active_transactions: i64,
    pub total_volume_cents: i64,
    pub upcoming: Vec<DigestItem>,
    pub overdue: Vec<DigestItem>,
    pub completed: Vec<DigestItem>,
}

fn decode<T: for<'de> Deserialize<'de>>(template: TemplateId, data: &Value) -> Result<T, TemplateError> {
    serde_json::from_value(data.clone()).map_err(|source| TemplateError::Payload { template, source })
}

pub fn format_cents(cents: i64) -> String {
    let dollars = cents / 100;
    let digits = dollars.abs().to_string();
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if cents < 0 { "-" } else { "" };
    format!("{sign}${grouped}")
}

fn plural(count: i64, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

fn list_section(out: &mut String, title: &str, items: &[DigestItem]) {
    out.push_str(&format!("\n{title} ({}):\n", items.len()));
    if items.is_empty() {
        out.push_str("  none\n");
    }
    for item in items {
        out.push_str(&format!(
            "  - {} at {} ({})\n",
            item.milestone_name,
            item.property_address,
            item.due_date.format("%b %-d, %Y")
        ));
    }
}

pub fn render(template: TemplateId, data: &Value) -> Result<RenderedMessage, TemplateError> {
    match template {
        TemplateId::DeadlineReminder => {
            let payload: MilestonePayload = decode(template, data)?;
            let when = match payload.days_until_due {
                0 => "today".to_string(),
                1 => "tomorrow".to_string(),
                days => format!("in {}", plural(days, "day")),
            };
            Ok(RenderedMessage {
                subject: format!(
                    "Reminder: {} due {} for {}",
                    payload.milestone_name, when, payload.property_address
                ),
                body: format!(
                    "Hi {},\n\n{} for {} is due {} ({}).\n\nMark it complete once it is done so your timeline stays current.\n",
                    payload.recipient_name,
                    payload.milestone_name,
                    payload.property_address,
                    when,
                    payload.due_date.format("%A, %B %-d, %Y")
                ),
            })
        }
        TemplateId::OverdueAlert => {
            let payload: MilestonePayload = decode(template, data)?;
            let late = plural(-payload.days_until_due, "day");
            Ok(RenderedMessage {
                subject: format!(
                    "Overdue: {} for {}",
                    payload.milestone_name, payload.property_address
                ),
                body: format!(
                    "Hi {},\n\n{} for {} was due {} and is {} overdue.\n\nComplete or waive it to clear this alert.\n",
                    payload.recipient_name,
                    payload.milestone_name,
                    payload.property_address,
                    payload.due_date.format("%A, %B %-d, %Y"),
                    late
                ),
            })
        }
        TemplateId::WeeklyDigest => {
            let payload: DigestPayload = decode(template, data)?;
            let mut body = format!(
                "Hi {},\n\nYou have {} worth {}.\n",
                payload.recipient_name,
                plural(payload.active_transactions, "active transaction"),
                format_cents(payload.total_volume_cents)
            );
            list_section(&mut body, "Due this week", &payload.upcoming);
            list_section(&mut body, "Overdue", &payload.overdue);
            list_section(&mut body, "Completed in the last 7 days", &payload.completed);
            Ok(RenderedMessage {
                subject: format!(
                    "Your weekly summary: {} upcoming, {} overdue",
                    payload.upcoming.len(),
                    payload.overdue.len()
                ),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_deadline_reminder() {
        let message = render(
            TemplateId::DeadlineReminder,
            &json!({
                "recipient_name": "Avery",
                "milestone_name": "Home Inspection",
                "property_address": "42 Elm Road",
                "due_date": "2026-02-01",
                "days_until_due": 1
            }),
        )
        .unwrap();
        assert_eq!(
            message.subject,
            "Reminder: Home Inspection due tomorrow for 42 Elm Road"
        );
        assert!(message.body.contains("Sunday, February 1, 2026"));
    }

    #[test]
    fn renders_overdue_alert() {
        let message = render(
            TemplateId::OverdueAlert,
            &json!({
                "recipient_name": "Avery",
                "milestone_name": "Appraisal",
                "property_address": "42 Elm Road",
                "due_date": "2026-02-12",
                "days_until_due": -3
            }),
        )
        .unwrap();
        assert!(message.subject.starts_with("Overdue: Appraisal"));
        assert!(message.body.contains("3 days overdue"));
    }

    #[test]
    fn renders_weekly_digest() {
        let payload = DigestPayload {
            recipient_name: "Avery".into(),
            active_transactions: 2,
            total_volume_cents: 123_456_789_00,
            upcoming: vec![DigestItem {
                milestone_name: "Closing".into(),
                property_address: "42 Elm Road".into(),
                due_date: NaiveDate::from_ymd_opt(2026, 3, 13).unwrap(),
            }],
            overdue: Vec::new(),
            completed: Vec::new(),
        };
        let message = render(
            TemplateId::WeeklyDigest,
            &serde_json::to_value(&payload).unwrap(),
        )
        .unwrap();
        assert_eq!(message.subject, "Your weekly summary: 1 upcoming, 0 overdue");
        assert!(message.body.contains("2 active transactions worth $123,456,789"));
        assert!(message.body.contains("Closing at 42 Elm Road (Mar 13, 2026)"));
    }

    #[test]
    fn rejects_mismatched_payload() {
        let err = render(TemplateId::OverdueAlert, &json!({ "unexpected": true })).unwrap_err();
        assert!(err.to_string().contains("overdue_alert"));
    }

    #[test]
    fn formats_currency() {
        assert_eq!(format_cents(0), "$0");
        assert_eq!(format_cents(99_900), "$999");
        assert_eq!(format_cents(450_000_00), "$450,000");
    }
}
