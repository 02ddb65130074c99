use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;

use super::templates::{render, RenderedMessage};
use super::{Notification, NotificationContent, NotificationTransport, TransportError};

fn resolve(notification: &Notification) -> Result<RenderedMessage, TransportError> {
    match &notification.content {
        NotificationContent::Template { template, data } => Ok(render(*template, data)?),
        NotificationContent::Raw { subject, body } => Ok(RenderedMessage {
            subject: subject.clone(),
            body: body.clone(),
        }),
    }
}

#[derive(Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Delivers mail through a JSON HTTP API (`POST {endpoint}` with a bearer key).
pub struct HttpMailTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl NotificationTransport for HttpMailTransport {
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        let message = resolve(notification)?;
        let payload = OutboundEmail {
            from: &self.from,
            to: [notification.to.as_str()],
            subject: &message.subject,
            text: &message.body,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = body.trim();
            return Err(TransportError::Rejected(if detail.is_empty() {
                status.to_string()
            } else {
                format!("{status}: {detail}")
            }));
        }

        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        let message = resolve(notification)?;
        info!(
            to = %notification.to,
            subject = %message.subject,
            "mail delivery disabled; message logged only"
        );
        Ok(())
    }
}

/// HTTP delivery when `MAIL_API_URL` is set, otherwise log-only.
pub fn from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn NotificationTransport>> {
    match &config.mail_api_url {
        Some(endpoint) => {
            info!(endpoint = %endpoint, from = %config.mail_from, "mail delivery via HTTP API");
            Ok(Arc::new(HttpMailTransport::new(
                endpoint.clone(),
                config.mail_api_key.clone(),
                config.mail_from.clone(),
            )?))
        }
        None => {
            info!("MAIL_API_URL not set; notifications will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}
