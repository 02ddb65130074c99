use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod cron;
pub mod documents;
pub mod health;
pub mod milestones;
pub mod notifications;
pub mod signing;
pub mod transactions;

const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 50;

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let transaction_routes = Router::new()
        .route(
            "/",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route("/draft", post(transactions::create_draft_transaction))
        .route("/intake", post(transactions::intake_contract))
        .route(
            "/:id",
            get(transactions::get_transaction)
                .patch(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route("/:id/milestones", get(milestones::list_milestones))
        .route("/:id/activity", get(transactions::list_activity))
        .route(
            "/:id/documents",
            get(documents::list_documents).post(documents::upload_document),
        );

    let document_routes = Router::new()
        .route(
            "/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/:id/download", get(documents::download_document))
        .route(
            "/:id/fields",
            get(documents::get_fields).put(documents::replace_fields),
        )
        .route(
            "/:id/signing-sessions",
            get(documents::list_signing_sessions).post(documents::create_signing_sessions),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/transactions", transaction_routes)
        .nest("/api/documents", document_routes)
        .route("/api/milestones/:id", patch(milestones::update_milestone))
        .route(
            "/api/notifications/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(
            protected_state,
        ));

    let signing_routes = Router::new()
        .route(
            "/:token",
            get(signing::view_session).post(signing::submit_session),
        )
        .route("/:token/file", get(signing::session_file));

    let cron_routes = Router::new()
        .route("/reminders", post(cron::run_reminders))
        .route("/weekly-digest", post(cron::run_weekly_digest));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/sign", signing_routes)
        .nest("/api/cron", cron_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
