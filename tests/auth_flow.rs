mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct CurrentUser {
    email: String,
    name: String,
}

#[tokio::test]
async fn register_login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "email": " Casey@Example.com ",
                "name": "Casey Agent",
                "password": "closing-time-2026"
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = read_json(response).await?;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["user"]["email"], "casey@example.com");

    let token = app
        .login_token("casey@example.com", "closing-time-2026")
        .await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let user: CurrentUser = read_json(response).await?;
    assert_eq!(user.email, "casey@example.com");
    assert_eq!(user.name, "Casey Agent");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("casey@example.com", "Casey", "closing-time-2026")
        .await?;
    let response = app
        .post_json(
            "/api/auth/register",
            &json!({
                "email": "CASEY@example.com",
                "name": "Casey Again",
                "password": "another-password"
            }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn short_passwords_are_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_json(
            "/api/auth/register",
            &json!({ "email": "casey@example.com", "name": "Casey", "password": "short" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("casey@example.com", "Casey", "closing-time-2026")
        .await?;
    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "casey@example.com", "password": "wrong-password" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/transactions", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/api/transactions", Some("not-a-jwt")).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}
