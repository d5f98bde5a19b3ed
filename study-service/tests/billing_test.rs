mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use serde_json::json;
use study_service::models::MembershipPatch;
use uuid::Uuid;

async fn open_session(app: &TestApp, user: Uuid, class_id: Uuid) -> String {
    let response = app
        .post("/api/v1/chat/sessions", user)
        .json(&json!({"class_id": class_id, "title": "Billing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let session: serde_json::Value = response.json().await.unwrap();
    session["session_id"].as_str().unwrap().to_string()
}

async fn send_turn(app: &TestApp, user: Uuid, session_id: &str) {
    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session_id), user)
        .json(&json!({"content": "What is an eigenvalue?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn sponsored_member_bills_to_the_class_owner() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    app.db
        .update_membership(
            member,
            class.class_id,
            &MembershipPatch {
                is_sponsored: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let session = open_session(&app, member, class.class_id).await;
    send_turn(&app, member, &session).await;

    let records = app
        .db
        .list_usage_records(member, class.class_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.billed_to_user_id, owner);
    assert!(record.is_sponsored);
    assert!(!record.is_overflow);

    app.cleanup().await;
}

#[tokio::test]
async fn unsponsored_member_pays_for_themselves_as_overflow() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let session = open_session(&app, member, class.class_id).await;
    send_turn(&app, member, &session).await;

    let records = app
        .db
        .list_usage_records(member, class.class_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.billed_to_user_id, member);
    assert!(!record.is_sponsored);
    assert!(record.is_overflow);

    app.cleanup().await;
}

#[tokio::test]
async fn ledger_row_carries_split_tokens_and_rounded_cost() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    // Mock provider reports 120 total tokens: 84 input, 36 output.
    let session = open_session(&app, owner, class.class_id).await;
    send_turn(&app, owner, &session).await;

    let records = app
        .db
        .list_usage_records(owner, class.class_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.input_tokens, 84);
    assert_eq!(record.output_tokens, 36);
    assert_eq!(record.total_tokens, 120);
    // 84 * 0.15/M + 36 * 0.60/M = 0.0000342, rounded to 6 places
    assert_eq!(record.cost, dec!(0.000034));
    assert_eq!(record.model_name, "mock-model");
    assert_eq!(record.operation_type, "chat");

    app.cleanup().await;
}

#[tokio::test]
async fn class_owner_is_sponsored_by_default() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    let session = open_session(&app, owner, class.class_id).await;
    send_turn(&app, owner, &session).await;

    let records = app
        .db
        .list_usage_records(owner, class.class_id)
        .await
        .unwrap();
    let record = &records[0];
    // Owner sponsorship points back at the owner themselves.
    assert_eq!(record.billed_to_user_id, owner);
    assert!(record.is_sponsored);

    app.cleanup().await;
}
