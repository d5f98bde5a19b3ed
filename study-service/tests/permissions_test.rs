mod common;

use common::TestApp;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn patch_rejects_inverted_window_ordering() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    // Daily above the default weekly limit.
    let response = app
        .patch(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, member),
            owner,
        )
        .json(&json!({"daily_token_limit": 10_000_000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn patch_rejects_unknown_fields() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let response = app
        .patch(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, member),
            owner,
        )
        .json(&json!({"joined_utc": "2020-01-01T00:00:00Z"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    app.cleanup().await;
}

#[tokio::test]
async fn patch_updates_flags_and_limits() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let response = app
        .patch(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, member),
            owner,
        )
        .json(&json!({
            "can_chat": false,
            "is_sponsored": true,
            "daily_token_limit": 500_000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let membership: serde_json::Value = response.json().await.unwrap();
    assert!(!membership["can_chat"].as_bool().unwrap());
    assert!(membership["is_sponsored"].as_bool().unwrap());
    assert_eq!(membership["daily_token_limit"].as_i64().unwrap(), 500_000);
    // Untouched fields keep their defaults.
    assert_eq!(membership["weekly_token_limit"].as_i64().unwrap(), 5_000_000);

    app.cleanup().await;
}

#[tokio::test]
async fn managers_cannot_demote_themselves() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let class = app.create_class(owner).await;

    let response = app
        .patch(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, owner),
            owner,
        )
        .json(&json!({"is_manager": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn non_managers_cannot_patch_memberships() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let response = app
        .patch(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, owner),
            member,
        )
        .json(&json!({"can_chat": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn limits_endpoint_validates_ordering_and_positivity() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let path = format!(
        "/api/v1/classes/{}/members/{}/limits",
        class.class_id, member
    );

    // weekly > monthly
    let response = app
        .put(&path, owner)
        .json(&json!({
            "daily_token_limit": 1_000,
            "weekly_token_limit": 20_000_000,
            "monthly_token_limit": 15_000_000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // zero is rejected by field validation
    let response = app
        .put(&path, owner)
        .json(&json!({
            "daily_token_limit": 0,
            "weekly_token_limit": 1_000,
            "monthly_token_limit": 10_000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // a well-ordered triple lands
    let response = app
        .put(&path, owner)
        .json(&json!({
            "daily_token_limit": 100_000,
            "weekly_token_limit": 500_000,
            "monthly_token_limit": 1_500_000
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let membership: serde_json::Value = response.json().await.unwrap();
    assert_eq!(membership["daily_token_limit"].as_i64().unwrap(), 100_000);

    app.cleanup().await;
}

#[tokio::test]
async fn sponsorship_toggle_covers_non_managers_only() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(first, class.class_id).await;
    app.enroll(second, class.class_id).await;

    let response = app
        .put(&format!("/api/v1/classes/{}/sponsorship", class.class_id), owner)
        .json(&json!({"is_sponsored": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["memberships_updated"].as_u64().unwrap(), 2);

    let membership = app
        .db
        .get_membership(first, class.class_id)
        .await
        .unwrap()
        .unwrap();
    assert!(membership.is_sponsored);

    app.cleanup().await;
}

#[tokio::test]
async fn eligibility_endpoint_reports_denial_reason() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(member, class.class_id).await;

    let path = format!("/api/v1/classes/{}/eligibility", class.class_id);

    let response = app.get(&path, member).send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["can_chat"].as_bool().unwrap());

    app.patch(
        &format!("/api/v1/classes/{}/members/{}", class.class_id, member),
        owner,
    )
    .json(&json!({"can_chat": false}))
    .send()
    .await
    .unwrap();

    let response = app.get(&path, member).send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(!body["can_chat"].as_bool().unwrap());
    assert_eq!(
        body["reason"].as_str().unwrap(),
        "Chat is disabled for your membership"
    );

    app.cleanup().await;
}

#[tokio::test]
async fn members_can_leave_but_not_remove_others() {
    let app = TestApp::spawn().await;
    let owner = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let class = app.create_class(owner).await;
    app.enroll(first, class.class_id).await;
    app.enroll(second, class.class_id).await;

    // A member cannot remove another member.
    let response = app
        .delete(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, second),
            first,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // But can leave on their own.
    let response = app
        .delete(
            &format!("/api/v1/classes/{}/members/{}", class.class_id, first),
            first,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    assert!(app
        .db
        .get_membership(first, class.class_id)
        .await
        .unwrap()
        .is_none());

    app.cleanup().await;
}
