mod common;

use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn create_class_enrolls_the_owner_as_manager() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();

    let response = app
        .post("/api/v1/classes", owner)
        .json(&json!({"name": "Quantum Mechanics", "description": "Weekly seminar"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let class: serde_json::Value = response.json().await.unwrap();
    let class_id: Uuid = class["class_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(class["class_code"].as_str().unwrap().len(), 8);

    let membership = app
        .db
        .get_membership(owner, class_id)
        .await
        .unwrap()
        .expect("owner should be enrolled");
    assert!(membership.is_manager);
    assert!(membership.is_sponsored);

    app.cleanup().await;
}

#[tokio::test]
async fn get_class_reports_counts() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let response = app
        .get(&format!("/api/v1/classes/{}", class.class_id), owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["member_count"].as_i64().unwrap(), 2);
    assert_eq!(body["session_count"].as_i64().unwrap(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn joining_by_code_and_duplicate_join_conflicts() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;

    let response = app
        .post("/api/v1/classes/join", member)
        .json(&json!({"class_code": class.class_code}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let membership: serde_json::Value = response.json().await.unwrap();
    assert!(!membership["is_manager"].as_bool().unwrap());
    assert_eq!(membership["daily_token_limit"].as_i64().unwrap(), 1_000_000);

    let response = app
        .post("/api/v1/classes/join", member)
        .json(&json!({"class_code": class.class_code}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn joining_with_a_bad_code_is_not_found() {
    let app = TestApp::spawn().await;
    let member = Uuid::new_v4();

    let response = app
        .post("/api/v1/classes/join", member)
        .json(&json!({"class_code": "DEADBEEF"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn non_members_cannot_see_a_class() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let class = app.create_class(owner).await;

    let response = app
        .get(&format!("/api/v1/classes/{}", class.class_id), stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn only_the_owner_deletes_a_class() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let response = app
        .delete(&format!("/api/v1/classes/{}", class.class_id), member)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .delete(&format!("/api/v1/classes/{}", class.class_id), owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    app.cleanup().await;
}

#[tokio::test]
async fn deleting_a_class_keeps_the_ledger() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    // Complete one turn so a ledger row exists.
    let response = app
        .post("/api/v1/chat/sessions", owner)
        .json(&json!({"class_id": class.class_id, "title": "Before deletion"}))
        .send()
        .await
        .unwrap();
    let session: serde_json::Value = response.json().await.unwrap();
    let session_id = session["session_id"].as_str().unwrap();

    let response = app
        .post(&format!("/api/v1/chat/sessions/{}/messages", session_id), owner)
        .json(&json!({"content": "Remember this"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .delete(&format!("/api/v1/classes/{}", class.class_id), owner)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Membership and sessions are gone, the ledger row survives.
    assert!(app
        .db
        .get_membership(owner, class.class_id)
        .await
        .unwrap()
        .is_none());
    let records = app
        .db
        .list_usage_records(owner, class.class_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn list_classes_returns_only_mine() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();
    app.create_class(owner).await;
    app.create_class(other).await;

    let response = app.get("/api/v1/classes", owner).send().await.unwrap();
    let classes: Vec<serde_json::Value> = response.json().await.unwrap();
    assert_eq!(classes.len(), 1);

    app.cleanup().await;
}
