mod common;

use common::TestApp;
use serde_json::json;
use std::sync::Arc;
use study_service::models::MembershipPatch;
use study_service::services::providers::MockCompletionProvider;
use uuid::Uuid;

async fn open_session(app: &TestApp, user: Uuid, class_id: Uuid) -> String {
    let response = app
        .post("/api/v1/chat/sessions", user)
        .json(&json!({"class_id": class_id, "title": "Study session"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let session: serde_json::Value = response.json().await.unwrap();
    session["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_turn_persists_messages_and_commits_usage() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;
    let session = open_session(&app, owner, class.class_id).await;

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "Explain chapter 2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let turn: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        turn["assistant_message"]["content"].as_str().unwrap(),
        "The answer is in chapter 2."
    );
    assert_eq!(turn["total_tokens"].as_i64().unwrap(), 120);
    assert!(turn["response_time_ms"].as_i64().unwrap() >= 0);

    // Both sides of the turn are in the transcript.
    let response = app
        .get(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .send()
        .await
        .unwrap();
    let messages: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0]["is_user"].as_bool().unwrap());
    assert!(!messages[1]["is_user"].as_bool().unwrap());

    // And the spend landed in the tracker.
    let tracker = app
        .quota_engine()
        .refreshed_tracker(owner, class.class_id)
        .await
        .unwrap();
    assert_eq!(tracker.daily_tokens_used, 120);

    app.cleanup().await;
}

#[tokio::test]
async fn provider_failure_aborts_before_any_usage_is_written() {
    let app =
        TestApp::spawn_with_provider(Arc::new(MockCompletionProvider::failing())).await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;
    let session = open_session(&app, owner, class.class_id).await;

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "Explain chapter 2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    // No tokens committed, no ledger row.
    let tracker = app
        .quota_engine()
        .refreshed_tracker(owner, class.class_id)
        .await
        .unwrap();
    assert_eq!(tracker.daily_tokens_used, 0);

    let records = app
        .db
        .list_usage_records(owner, class.class_id)
        .await
        .unwrap();
    assert!(records.is_empty());

    // The user message stays; the turn produced no reply.
    let messages = app.db.list_messages(session.parse().unwrap()).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_user);

    app.cleanup().await;
}

#[tokio::test]
async fn completed_documents_feed_chat_context() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    let response = app
        .post(&format!("/api/v1/classes/{}/documents", class.class_id), owner)
        .json(&json!({
            "title": "Chapter 2",
            "extracted_text": "Eigenvalues scale eigenvectors."
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let session = open_session(&app, owner, class.class_id).await;
    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "What is an eigenvalue?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let turn: serde_json::Value = response.json().await.unwrap();
    assert!(turn["context_provided"].as_bool().unwrap());

    app.cleanup().await;
}

#[tokio::test]
async fn pending_documents_are_not_used_as_context() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    // No extracted text yet, so the document stays pending.
    let response = app
        .post(&format!("/api/v1/classes/{}/documents", class.class_id), owner)
        .json(&json!({"title": "Chapter 3"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let session = open_session(&app, owner, class.class_id).await;
    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "What is in chapter 3?"}))
        .send()
        .await
        .unwrap();
    let turn: serde_json::Value = response.json().await.unwrap();
    assert!(!turn["context_provided"].as_bool().unwrap());

    app.cleanup().await;
}

#[tokio::test]
async fn disabled_member_cannot_send_messages() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;
    let session = open_session(&app, owner, class.class_id).await;

    app.db
        .update_membership(
            owner,
            class.class_id,
            &MembershipPatch {
                can_chat: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "Still there?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn closed_sessions_reject_messages() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;
    let session = open_session(&app, owner, class.class_id).await;

    let response = app
        .delete(&format!("/api/v1/chat/sessions/{}", session), owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), owner)
        .json(&json!({"content": "One more thing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn sessions_are_private_to_their_owner() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(intruder, class.class_id).await;
    let session = open_session(&app, owner, class.class_id).await;

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session), intruder)
        .json(&json!({"content": "Peeking"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .get(&format!("/api/v1/chat/sessions/{}/messages", session), intruder)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}
