mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde_json::{json, Value};

fn contract() -> Value {
    json!({
        "property_address": "42 Elm Road, Westfield, NJ",
        "buyer_name": "Jordan Reyes",
        "seller_name": "Morgan Blake",
        "purchase_price_cents": 450_000_00,
        "effective_date": "2026-01-22",
        "closing_date": "2026-03-13",
        "financing_type": "conventional",
        "initial_deposit_cents": 5_000_00,
        "additional_deposit_cents": 40_000_00,
        "parties": [
            { "role": "buyer", "name": "Jordan Reyes", "email": "jordan@example.com" },
            { "role": "seller", "name": "Morgan Blake" }
        ]
    })
}

fn milestone_dates(detail: &Value) -> Vec<(String, String)> {
    detail["milestones"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|m| {
                    (
                        m["name"].as_str().unwrap_or_default().to_string(),
                        m["due_date"].as_str().unwrap_or_default().to_string(),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn create_transaction_builds_the_timeline() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let response = app
        .post_json("/api/transactions", &contract(), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail: Value = read_json(response).await?;

    assert_eq!(detail["status"], "new");
    assert_eq!(detail["parties"].as_array().map(Vec::len), Some(2));

    let dates = milestone_dates(&detail);
    let expected = [
        ("Attorney Review Ends", "2026-01-25"),
        ("Initial Deposit Due", "2026-01-27"),
        ("Home Inspection", "2026-02-01"),
        ("Additional Deposit Due", "2026-02-01"),
        ("Appraisal", "2026-02-12"),
        ("Mortgage Commitment", "2026-02-21"),
        ("Title Search Complete", "2026-02-27"),
        ("Final Walk-Through", "2026-03-12"),
        ("Closing", "2026-03-13"),
    ];
    let expected: Vec<(String, String)> = expected
        .iter()
        .map(|(name, date)| (name.to_string(), date.to_string()))
        .collect();
    assert_eq!(dates, expected);
    assert!(dates.iter().all(|(_, due)| due.as_str() <= "2026-03-13"));

    let id = detail["id"].as_str().unwrap_or_default().to_string();
    let response = app
        .get(&format!("/api/transactions/{id}/activity"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let activity: Value = read_json(response).await?;
    assert!(activity
        .as_array()
        .is_some_and(|entries| entries.iter().any(|e| e["action"] == "transaction_created")));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn cash_purchase_skips_lender_milestones() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let mut body = contract();
    body["financing_type"] = json!("cash");
    body["additional_deposit_cents"] = Value::Null;
    let response = app.post_json("/api/transactions", &body, Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail: Value = read_json(response).await?;

    let names: Vec<String> = milestone_dates(&detail).into_iter().map(|(n, _)| n).collect();
    assert!(!names.iter().any(|n| n == "Appraisal" || n == "Mortgage Commitment"));
    assert!(!names.iter().any(|n| n == "Additional Deposit Due"));
    assert_eq!(names.last().map(String::as_str), Some("Closing"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_contracts_are_rejected() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let mut missing_closing = contract();
    missing_closing["closing_date"] = Value::Null;
    let response = app
        .post_json("/api/transactions", &missing_closing, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut backwards = contract();
    backwards["closing_date"] = json!("2026-01-01");
    let response = app
        .post_json("/api/transactions", &backwards, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bad_financing = contract();
    bad_financing["financing_type"] = json!("barter");
    let response = app
        .post_json("/api/transactions", &bad_financing, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/transactions", Some(&token)).await?;
    let list: Value = read_json(response).await?;
    assert_eq!(list.as_array().map(Vec::len), Some(0));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_get_structured_errors() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let mut no_address = contract();
    if let Some(fields) = no_address.as_object_mut() {
        fields.remove("property_address");
    }
    let response = app
        .post_json("/api/transactions", &no_address, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await?;
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("property_address")));

    let mut impossible_date = contract();
    impossible_date["effective_date"] = json!("2026-02-30");
    let response = app
        .post_json("/api/transactions", &impossible_date, Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await?;
    assert!(body["error"].is_string());

    let response = app
        .post_json("/api/transactions", &json!([1, 2, 3]), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/transactions", Some(&token)).await?;
    let list: Value = read_json(response).await?;
    assert_eq!(list.as_array().map(Vec::len), Some(0));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn drafts_start_without_milestones() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let response = app
        .post_json("/api/transactions/draft", &json!({}), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail: Value = read_json(response).await?;
    assert_eq!(detail["status"], "draft");
    assert_eq!(detail["milestones"].as_array().map(Vec::len), Some(0));
    assert!(detail["property_address"].is_null());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn transactions_are_scoped_to_their_owner() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let owner = app.signed_in("owner@example.com").await?;
    let other = app.signed_in("other@example.com").await?;

    let response = app
        .post_json("/api/transactions", &contract(), Some(&owner))
        .await?;
    let detail: Value = read_json(response).await?;
    let id = detail["id"].as_str().unwrap_or_default().to_string();
    let path = format!("/api/transactions/{id}");

    assert_eq!(app.get(&path, Some(&other)).await?.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.patch_json(&path, &json!({ "status": "cancelled" }), Some(&other))
            .await?
            .status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(app.delete(&path, Some(&other)).await?.status(), StatusCode::NOT_FOUND);

    let list: Value = read_json(app.get("/api/transactions", Some(&other)).await?).await?;
    assert_eq!(list.as_array().map(Vec::len), Some(0));

    assert_eq!(app.get(&path, Some(&owner)).await?.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn manual_status_change_is_logged() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let detail: Value = read_json(
        app.post_json("/api/transactions", &contract(), Some(&token))
            .await?,
    )
    .await?;
    let id = detail["id"].as_str().unwrap_or_default().to_string();

    let response = app
        .patch_json(
            &format!("/api/transactions/{id}"),
            &json!({ "status": "cancelled" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = read_json(response).await?;
    assert_eq!(updated["status"], "cancelled");

    let response = app
        .patch_json(
            &format!("/api/transactions/{id}"),
            &json!({ "status": "sold" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let activity: Value = read_json(
        app.get(&format!("/api/transactions/{id}/activity"), Some(&token))
            .await?,
    )
    .await?;
    assert!(activity.as_array().is_some_and(|entries| entries
        .iter()
        .any(|e| e["action"] == "transaction_status_changed")));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn contract_intake_creates_a_parsed_transaction() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    let token = app.signed_in("agent@example.com").await?;

    let response = app
        .upload_file(
            "/api/transactions/intake",
            "17_Birch_Court_Cranford_NJ.pdf",
            "application/pdf",
            b"%PDF-1.7 contract",
            &token,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let detail: Value = read_json(response).await?;

    assert_eq!(detail["property_address"], "17 Birch Court Cranford NJ");
    assert_eq!(detail["status"], "new");
    assert_eq!(detail["effective_date"], "2026-01-22");
    assert!(detail["milestones"].as_array().is_some_and(|m| !m.is_empty()));
    assert_eq!(detail["documents"][0]["status"], "parsed");
    assert_eq!(app.parser().calls(), 1);
    assert_eq!(app.storage().object_count().await, 1);

    let id = detail["id"].as_str().unwrap_or_default().to_string();
    let response = app
        .delete(&format!("/api/transactions/{id}"), Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.storage().object_count().await, 0);

    app.cleanup().await?;
    Ok(())
}
