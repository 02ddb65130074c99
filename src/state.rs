use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    notifications::NotificationTransport,
    parser::ContractParser,
    storage::ObjectStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared handles for request handlers. Collaborators sit behind trait
/// objects so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    pub parser: Arc<dyn ContractParser>,
    pub mailer: Arc<dyn NotificationTransport>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
        parser: Arc<dyn ContractParser>,
        mailer: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            parser,
            mailer,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
