use std::time::Duration;

use anyhow::anyhow;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    init_pool_with_size(database_url, DEFAULT_MAX_POOL_SIZE)
}

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool_size = max_size.max(1);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

pub fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool
        .get()
        .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
    if !applied.is_empty() {
        tracing::info!(count = applied.len(), "applied pending migrations");
    }
    Ok(())
}
