use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use closingdesk::{
    auth::jwt::JwtService,
    config::AppConfig,
    db, init_tracing,
    notifications::transport,
    parser::MockContractParser,
    routes, s3,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        public_base_url = %config.public_base_url,
        mail_enabled = config.mail_api_url.is_some(),
        cron_enabled = config.cron_secret.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let storage = Arc::new(s3::contract_storage(&config).await?);
    let mailer = transport::from_config(&config)?;
    let jwt = JwtService::from_config(&config);
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("SERVER_HOST/SERVER_PORT do not form a socket address")?;

    let state = AppState::new(
        pool,
        config,
        storage,
        jwt,
        Arc::new(MockContractParser::new()),
        mailer,
    );
    let app = routes::create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}
