use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::notifications::DEFAULT_REMINDER_LEAD_DAYS;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub public_base_url: String,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
    pub cron_secret: Option<String>,
    pub reminder_default_lead_days: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "closingdesk".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "closingdesk-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();
        let mail_api_url = env::var("MAIL_API_URL").ok();
        let mail_api_key = env::var("MAIL_API_KEY").ok();
        let mail_from =
            env::var("MAIL_FROM").unwrap_or_else(|_| "ClosingDesk <noreply@closingdesk.app>".to_string());
        let cron_secret = env::var("CRON_SECRET").ok().filter(|value| !value.is_empty());
        let reminder_default_lead_days = env::var("REMINDER_DEFAULT_LEAD_DAYS")
            .unwrap_or_else(|_| DEFAULT_REMINDER_LEAD_DAYS.to_string())
            .parse()
            .context("REMINDER_DEFAULT_LEAD_DAYS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            public_base_url,
            mail_api_url,
            mail_api_key,
            mail_from,
            cron_secret,
            reminder_default_lead_days,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn signing_link(&self, token: &str) -> String {
        format!("{}/sign/{}", self.public_base_url, token)
    }
}

fn redact_database_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return "***".to_string();
    };
    if parsed.password().is_none() {
        return parsed.to_string();
    }
    match parsed.set_password(Some("*****")) {
        Ok(()) => parsed.to_string(),
        Err(()) => "***".to_string(),
    }
}
