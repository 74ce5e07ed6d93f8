//! Integration tests for the authentication flows: register, login,
//! refresh rotation, logout, and the authenticated profile/session routes.

mod support;

use axum::http::StatusCode;
use serde_json::json;

use support::{access_token, refresh_token, test_app, user_id};

#[tokio::test]
async fn register_then_login_round_trips() {
    let app = test_app();
    let registered = app.register("alice", "alice@example.com", "hunter2hunter2").await;
    let id = user_id(&registered);

    // Identifier lookup is case-insensitive, via username or email.
    for identifier in ["alice", "ALICE", "Alice@Example.COM"] {
        let (status, body) = app
            .request(
                "POST",
                "/auth/login",
                None,
                Some(json!({"identifier": identifier, "password": "hunter2hunter2"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login as {identifier}: {body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["tokenType"], "Bearer");
        assert_eq!(body["data"]["user"]["id"], registered["user"]["id"]);
        assert!(body["data"]["accessToken"].as_str().unwrap().contains('.'));
    }

    // One session from registration plus one per login.
    let sessions = app.identities.sessions_snapshot(id);
    assert_eq!(sessions.len(), 4);
    assert!(sessions.iter().all(|s| s.revoked_at.is_none()));
}

#[tokio::test]
async fn wrong_password_fails_and_bumps_the_failed_access_counter() {
    let app = test_app();
    let registered = app.register("bob", "bob@example.com", "correct-password").await;
    let id = user_id(&registered);

    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": "bob", "password": "wrong-password"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid credentials");

    let identity = app.identities.identity_snapshot(id).unwrap();
    assert_eq!(identity.failed_access_count, 1);
    // No session beyond the registration one was created.
    assert_eq!(app.identities.sessions_snapshot(id).len(), 1);

    // A successful login resets the counter.
    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": "bob", "password": "correct-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let identity = app.identities.identity_snapshot(id).unwrap();
    assert_eq!(identity.failed_access_count, 0);
}

#[tokio::test]
async fn unknown_locked_and_deleted_identities_all_fail_the_same_way() {
    let app = test_app();
    let registered = app.register("carol", "carol@example.com", "a-long-password").await;
    let id = user_id(&registered);

    let attempt = |identifier: &str| {
        json!({"identifier": identifier, "password": "a-long-password"})
    };

    let (status, body) = app
        .request("POST", "/auth/login", None, Some(attempt("nobody")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid credentials");

    app.identities.set_locked(id, true);
    let (status, body) = app
        .request("POST", "/auth/login", None, Some(attempt("carol")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid credentials");

    app.identities.set_locked(id, false);
    app.identities.set_deleted(id, true);
    let (status, body) = app
        .request("POST", "/auth/login", None, Some(attempt("carol")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid credentials");

    // Only the registration session exists.
    assert_eq!(app.identities.sessions_snapshot(id).len(), 1);
}

#[tokio::test]
async fn refresh_rotates_the_session_and_kills_replays() {
    let app = test_app();
    let registered = app.register("dave", "dave@example.com", "dave-password").await;
    let id = user_id(&registered);
    let first_refresh = refresh_token(&registered);

    let (status, body) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": first_refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let second_refresh = refresh_token(&body["data"]);
    assert_ne!(first_refresh, second_refresh);

    // Replaying the rotated-out token fails and creates nothing.
    let (status, body) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": first_refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or expired refresh token");

    // The rotated-in token still works.
    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": second_refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let sessions = app.identities.sessions_snapshot(id);
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions.iter().filter(|s| s.revoked_at.is_none()).count(), 1);
}

#[tokio::test]
async fn refresh_with_an_unknown_token_fails() {
    let app = test_app();
    let (status, body) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": "not-a-real-token"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid or expired refresh token");
}

#[tokio::test]
async fn logout_is_idempotent_and_invalidates_the_refresh_token() {
    let app = test_app();
    let registered = app.register("erin", "erin@example.com", "erin-password").await;
    let token = refresh_token(&registered);

    for _ in 0..2 {
        let (status, body) = app
            .request(
                "POST",
                "/auth/logout",
                None,
                Some(json!({"refreshToken": token})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, _) = app
        .request(
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": token})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let app = test_app();
    let registered = app.register("fay", "fay@example.com", "fay-password-1").await;
    let id = user_id(&registered);
    let access = access_token(&registered);

    // A second concurrent session.
    let (status, login) = app
        .request(
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": "fay", "password": "fay-password-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request("POST", "/auth/logout-all", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let sessions = app.identities.sessions_snapshot(id);
    assert!(sessions.iter().all(|s| s.revoked_at.is_some()));

    for token in [refresh_token(&registered), refresh_token(&login["data"])] {
        let (status, _) = app
            .request(
                "POST",
                "/auth/refresh",
                None,
                Some(json!({"refreshToken": token})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked_individually() {
    let app = test_app();
    let registered = app.register("gil", "gil@example.com", "gil-password-1").await;
    let access = access_token(&registered);

    let (status, body) = app.request("GET", "/sessions", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    let session_id = sessions[0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request("DELETE", &format!("/sessions/{session_id}"), Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request("GET", "/sessions", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Revoking a session that is gone is a 404, not a crash.
    let (status, body) = app
        .request("DELETE", &format!("/sessions/{session_id}"), Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn me_aggregates_roles_and_permissions_without_duplicates() {
    let app = test_app();
    let registered = app.register("hana", "hana@example.com", "hana-password").await;
    let id = user_id(&registered);
    let access = access_token(&registered);

    // "Editor" arrives twice: directly and via a group. "Viewer" only via
    // a group. Both roles grant documents.read.
    app.identities.grant_role(id, "Editor");
    app.identities.grant_group_role(id, "Editor");
    app.identities.grant_group_role(id, "Viewer");
    app.identities.grant_role_permission("Editor", "documents.read");
    app.identities.grant_role_permission("Editor", "documents.write");
    app.identities.grant_role_permission("Viewer", "documents.read");

    let (status, body) = app.request("GET", "/users/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["roles"], json!(["Editor", "Viewer"]));
    assert_eq!(
        body["data"]["permissions"],
        json!(["documents.read", "documents.write"])
    );
    assert_eq!(body["data"]["email"], "hana@example.com");
}

#[tokio::test]
async fn protected_routes_reject_missing_or_bad_credentials() {
    let app = test_app();

    let (status, body) = app.request("GET", "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .request("GET", "/users/me", Some("garbage.token.here"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_validation_errors_are_field_keyed() {
    let app = test_app();
    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "x", "email": "nope", "password": "short"})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let errors = body["errors"].as_object().expect("field-keyed errors");
    assert!(errors.contains_key("username"));
    assert!(errors.contains_key("email"));
    assert!(errors.contains_key("password"));
}

#[tokio::test]
async fn duplicate_registration_is_a_conflict_failure() {
    let app = test_app();
    app.register("ivan", "ivan@example.com", "ivan-password").await;

    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "username": "IVAN",
                "email": "other@example.com",
                "password": "ivan-password",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Username or email is already taken");
}
