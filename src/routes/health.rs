use axum::{extract::State, http::StatusCode, response::Json};
use diesel::connection::SimpleConnection;
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.db() {
        Ok(mut conn) => conn.batch_execute("SELECT 1").is_ok(),
        Err(err) => {
            warn!(error = %err, "health check could not reach the database");
            false
        }
    };

    if database {
        (StatusCode::OK, Json(json!({ "status": "ok", "database": "up" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        )
    }
}
