#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use closingdesk::auth::jwt::JwtService;
use closingdesk::auth::password::hash_password;
use closingdesk::config::AppConfig;
use closingdesk::db::{self, PgPool, MIGRATIONS};
use closingdesk::models::NewUser;
use closingdesk::notifications::{
    Notification, NotificationContent, NotificationTransport, TemplateId, TransportError,
};
use closingdesk::parser::{
    ContractParser, MockContractParser, ParseRequest, ParsedContract, ParserError,
};
use closingdesk::routes;
use closingdesk::state::AppState;
use closingdesk::storage::ObjectStorage;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const CRON_SECRET: &str = "test-cron-secret";

#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
        };
        self.objects.lock().await.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(
        &self,
        key: &str,
        expires_in: Duration,
        _content_disposition: Option<String>,
    ) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

/// Records every message; can be told to reject sends.
#[derive(Default)]
pub struct FakeTransport {
    sent: StdMutex<Vec<Notification>>,
    failing: AtomicBool,
}

#[async_trait]
impl NotificationTransport for FakeTransport {
    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("mailbox unavailable".into()));
        }
        self.sent
            .lock()
            .map_err(|_| TransportError::Unreachable("poisoned".into()))?
            .push(notification.clone());
        Ok(())
    }
}

impl FakeTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn sent_with_template(&self, template: TemplateId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| {
                matches!(&n.content, NotificationContent::Template { template: t, .. } if *t == template)
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.sent.lock() {
            guard.clear();
        }
    }
}

/// Counts invocations of the deterministic parser.
pub struct FakeParser {
    inner: MockContractParser,
    calls: AtomicUsize,
}

impl FakeParser {
    pub fn new(effective_date: NaiveDate) -> Self {
        Self {
            inner: MockContractParser::with_effective_date(effective_date),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContractParser for FakeParser {
    fn parse(&self, request: &ParseRequest) -> Result<ParsedContract, ParserError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(request)
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    mailer: Arc<FakeTransport>,
    parser: Arc<FakeParser>,
}

pub fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        s3_bucket: "test-bucket".to_string(),
        public_base_url: "https://app.test".to_string(),
        mail_api_url: None,
        mail_api_key: None,
        mail_from: "ClosingDesk <noreply@test>".to_string(),
        cron_secret: Some(CRON_SECRET.to_string()),
        reminder_default_lead_days: 3,
    }
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;
        let config = test_config(database_url);

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(FakeTransport::default());
        let parser = Arc::new(FakeParser::new(
            NaiveDate::from_ymd_opt(2026, 1, 22).context("valid date")?,
        ));
        let jwt = JwtService::from_config(&config);
        let state = AppState::new(
            pool,
            config,
            storage.clone(),
            jwt,
            parser.clone(),
            mailer.clone(),
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            mailer,
            parser,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(|conn| truncate_all(conn)).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn mailer(&self) -> Arc<FakeTransport> {
        self.mailer.clone()
    }

    pub fn parser(&self) -> Arc<FakeParser> {
        self.parser.clone()
    }

    pub async fn insert_user(&self, email: &str, name: &str, password: &str) -> Result<Uuid> {
        let email = email.to_string();
        let name = name.to_string();
        let password = password.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                name,
                password_hash: hash_password(&password)?,
            };
            diesel::insert_into(closingdesk::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        let body: Value = read_json(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response missing access_token"))
    }

    /// Registers a fresh account and returns its bearer token.
    pub async fn signed_in(&self, email: &str) -> Result<String> {
        self.insert_user(email, "Avery Coordinator", "correct horse battery")
            .await?;
        self.login_token(email, "correct horse battery").await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn json_request<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(serde_json::to_vec(payload)?))?)
            .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.json_request(Method::POST, path, payload, token).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.json_request(Method::PUT, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.json_request(Method::PATCH, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::DELETE).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn post_cron(&self, path: &str, secret: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        if let Some(secret) = secret {
            builder = builder.header("authorization", format!("Bearer {secret}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn upload_file(
        &self,
        path: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).with_context(|| {
        format!(
            "unexpected response body: {}",
            String::from_utf8_lossy(&body)
        )
    })
}

/// Token at the end of a `{base}/sign/{token}` link.
pub fn token_from_url(url: &str) -> Result<String> {
    url.rsplit('/')
        .next()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no token in {url}"))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE sent_reminders, notification_preferences, activity_log, field_values, \
         signing_sessions, document_fields, documents, parties, milestones, transactions, users \
         RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
