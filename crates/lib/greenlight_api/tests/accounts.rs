//! Integration tests for registration, activation, login and password reset.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use greenlight_api::services::mailer::Notification;
use greenlight_core::store::{PermissionStore, UserStore};
use serde_json::json;

fn welcome_token(app: &TestApp, email: &str) -> String {
    app.mailer
        .sent()
        .into_iter()
        .find_map(|(to, n)| match n {
            Notification::Welcome {
                activation_token, ..
            } if to == email => Some(activation_token),
            _ => None,
        })
        .expect("welcome notification")
}

#[tokio::test]
async fn registration_then_activation() {
    let app = TestApp::new();

    let resp = app
        .send(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "name": "Alice Smith",
                "email": "alice@example.com",
                "password": "pa55word!"
            })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);
    assert_eq!(resp.json["user"]["activated"], false);
    assert!(resp.json["user"].get("password_hash").is_none());
    let user_id = resp.json["user"]["id"].as_i64().unwrap();

    let permissions = app.store.list_codes_for_user(user_id).await.unwrap();
    assert_eq!(permissions.codes(), ["movies:read"]);

    app.drain_background().await;
    let token = welcome_token(&app, "alice@example.com");
    assert_eq!(token.len(), 26);

    let resp = app
        .send(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": token })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["user"]["activated"], true);
    assert_eq!(app.store.token_count(), 0);

    // Replaying the consumed token looks exactly like a token that never existed.
    let replay = app
        .send(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": token })),
        )
        .await;
    let never_issued = app
        .send(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": "ABCDEFGHIJKLMNOPQRSTUVWXYZ" })),
        )
        .await;
    assert_eq!(replay.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(replay.status, never_issued.status);
    assert_eq!(replay.json, never_issued.json);
    assert_eq!(
        replay.json["message"]["token"],
        "invalid or expired activation token"
    );
}

#[tokio::test]
async fn registration_validates_input() {
    let app = TestApp::new();

    let resp = app
        .send(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({ "name": "", "email": "nope", "password": "short" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp.json["error"], "validation_error");
    assert_eq!(resp.json["message"]["name"], "must be provided");
    assert_eq!(resp.json["message"]["email"], "must be a valid email address");
    assert_eq!(
        resp.json["message"]["password"],
        "must be at least 8 bytes long"
    );
}

#[tokio::test]
async fn duplicate_email_is_a_validation_error() {
    let app = TestApp::new();
    app.create_user("bob@example.com", "pa55word!", false).await;

    let resp = app
        .send(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "name": "Bob",
                "email": "BOB@example.com",
                "password": "pa55word!"
            })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.json["message"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new();

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "a@example.com", "unexpected": true })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["error"], "bad_request");
}

#[tokio::test]
async fn authentication_token_round_trip() {
    let app = TestApp::new();
    let user = app.create_user("carol@example.com", "pa55word!", true).await;

    for (email, password) in [
        ("carol@example.com", "wrong-password"),
        ("nobody@example.com", "pa55word!"),
    ] {
        let resp = app
            .send(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED, "{email}");
        assert_eq!(resp.json["error"], "invalid_credentials");
    }

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "carol@example.com", "password": "pa55word!" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let token = resp.json["authentication_token"]["token"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(resp.json["authentication_token"]["expiry"].is_string());

    let resp = app
        .send(Method::GET, "/v1/users/me", Some(&token), None)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["user"]["id"], user.id);
}

#[tokio::test]
async fn activation_token_is_resent_only_to_inactive_users() {
    let app = TestApp::new();
    app.create_user("dave@example.com", "pa55word!", false).await;
    app.create_user("erin@example.com", "pa55word!", true).await;

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "dave@example.com" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "erin@example.com" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.json["message"]["email"],
        "user has already been activated"
    );

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/activation",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(
        resp.json["message"]["email"],
        "no matching email address found"
    );

    app.drain_background().await;
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "dave@example.com");
    assert!(matches!(sent[0].1, Notification::ActivationToken { .. }));
}

#[tokio::test]
async fn password_reset_flow() {
    let app = TestApp::new();
    let user = app.create_user("frank@example.com", "old-pa55word", true).await;

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/password-reset",
            None,
            Some(json!({ "email": "frank@example.com" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::ACCEPTED);

    app.drain_background().await;
    let token = app
        .mailer
        .sent()
        .into_iter()
        .find_map(|(_, n)| match n {
            Notification::PasswordReset { token, .. } => Some(token),
            _ => None,
        })
        .expect("password reset notification");

    let resp = app
        .send(
            Method::PUT,
            "/v1/users/password",
            None,
            Some(json!({ "password": "new-pa55word", "token": token })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["message"], "your password was successfully reset");

    let updated = app
        .store
        .get_by_email("frank@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.version, user.version + 1);

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "frank@example.com", "password": "new-pa55word" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    // The reset token is single use.
    let resp = app
        .send(
            Method::PUT,
            "/v1/users/password",
            None,
            Some(json!({ "password": "third-pa55word", "token": token })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.json["message"]["token"],
        "invalid or expired password reset token"
    );
}

#[tokio::test]
async fn password_reset_requires_an_activated_account() {
    let app = TestApp::new();
    app.create_user("grace@example.com", "pa55word!", false).await;

    let resp = app
        .send(
            Method::POST,
            "/v1/tokens/password-reset",
            None,
            Some(json!({ "email": "grace@example.com" })),
        )
        .await;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.json["message"]["email"],
        "user account must be activated"
    );
}
