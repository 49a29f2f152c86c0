//! Tests for refresh token rotation, reuse detection, and logout.

mod common;

use axum::http::StatusCode;
use common::*;

async fn setup_logged_in() -> (TestApp, i64, String) {
    let test = create_test_app().await;
    register_user(&test, "a@x.com", "longenough1", "A").await;
    let (_, refresh) = login_user(&test, "a@x.com", "longenough1").await;
    let user_id = test
        .db
        .users()
        .get_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap()
        .id;
    (test, user_id, refresh)
}

fn refresh_cookie(raw: &str) -> String {
    format!("{}={}", REFRESH_COOKIE, raw)
}

async fn rotate(test: &TestApp, raw: &str) -> axum::http::Response<axum::body::Body> {
    send(
        &test.app,
        "POST",
        "/auth/refresh",
        &[("cookie", refresh_cookie(raw).as_str())],
        None,
    )
    .await
}

#[tokio::test]
async fn test_refresh_rotates_the_chain() {
    let (test, user_id, refresh) = setup_logged_in().await;

    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    let new_refresh = cookie_value(&cookies, REFRESH_COOKIE).unwrap();
    assert_ne!(new_refresh, refresh, "rotation must issue a new secret");

    let json = body_json(response).await;
    assert!(!json["accessToken"].as_str().unwrap().is_empty());

    // Exactly one active link remains; the old one is rotated with a
    // forward pointer to its successor.
    let tokens = test.db.refresh_tokens().list_by_user(user_id).await.unwrap();
    assert_eq!(tokens.len(), 2);
    let rotated = tokens.iter().find(|t| t.is_rotated()).unwrap();
    let active = tokens.iter().find(|t| t.revoked_at.is_none()).unwrap();
    assert_eq!(rotated.replaced_by_token_id.as_deref(), Some(active.id.as_str()));
    assert!(rotated.last_used_at.is_some());
}

#[tokio::test]
async fn test_rotated_secret_reuse_tears_down_all_sessions() {
    let (test, user_id, refresh) = setup_logged_in().await;

    // A second device session that should be collateral of the teardown.
    let (_, other_refresh) = login_user(&test, "a@x.com", "longenough1").await;

    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::OK);
    let successor = cookie_value(&set_cookies(&response), REFRESH_COOKIE).unwrap();

    // Replaying the pre-rotation secret is the theft signal.
    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_REUSED");

    // Blanket logout: zero active links remain.
    let active = test
        .db
        .refresh_tokens()
        .count_active_for_user(user_id, now())
        .await
        .unwrap();
    assert_eq!(active, 0);

    // The legitimate successor and the other device are dead too, but as
    // plain revocations; the chain is not reuse all the way down.
    let response = rotate(&test, &successor).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_REVOKED");

    let response = rotate(&test, &other_refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_REVOKED");
}

#[tokio::test]
async fn test_refresh_with_unknown_secret_rejected() {
    let (test, _, _) = setup_logged_in().await;

    let response = rotate(&test, "0123456789abcdef0123456789abcdef").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_INVALID");
}

#[tokio::test]
async fn test_refresh_without_cookie_rejected() {
    let (test, _, _) = setup_logged_in().await;

    let response = send(&test.app, "POST", "/auth/refresh", &[], None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_MISSING");
}

#[tokio::test]
async fn test_refresh_expired_secret_rejected() {
    let (test, _, refresh) = setup_logged_in().await;

    // Age the ledger entry past its expiry.
    sqlx::query("UPDATE refresh_tokens SET expires_at = 100")
        .execute(test.db.pool())
        .await
        .unwrap();

    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_refresh_for_disabled_user_rejected() {
    let (test, user_id, refresh) = setup_logged_in().await;

    test.db.users().set_active(user_id, false, now()).await.unwrap();

    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "USER_DISABLED");
}

#[tokio::test]
async fn test_logout_revokes_without_chaining() {
    let (test, user_id, refresh) = setup_logged_in().await;

    let response = send(
        &test.app,
        "POST",
        "/auth/logout",
        &[("cookie", refresh_cookie(&refresh).as_str())],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(has_cleared_cookie(&set_cookies(&response), REFRESH_COOKIE));

    // Logout is plain revocation, not rotation: no successor pointer, so a
    // later replay reads as revoked, never as reuse.
    let tokens = test.db.refresh_tokens().list_by_user(user_id).await.unwrap();
    assert!(tokens[0].revoked_at.is_some());
    assert!(tokens[0].replaced_by_token_id.is_none());

    let response = rotate(&test, &refresh).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "REFRESH_TOKEN_REVOKED");
}

#[tokio::test]
async fn test_logout_without_cookie_is_silent_noop() {
    let test = create_test_app().await;

    let response = send(&test.app, "POST", "/auth/logout", &[], None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "LOGGED_OUT");
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let (test, user_id, refresh) = setup_logged_in().await;

    for _ in 0..2 {
        let response = send(
            &test.app,
            "POST",
            "/auth/logout",
            &[("cookie", refresh_cookie(&refresh).as_str())],
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let tokens = test.db.refresh_tokens().list_by_user(user_id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].revoked_at.is_some());
}

#[tokio::test]
async fn test_logout_all_revokes_every_session() {
    let (test, user_id, _refresh) = setup_logged_in().await;
    let (access, _) = login_user(&test, "a@x.com", "longenough1").await;
    login_user(&test, "a@x.com", "longenough1").await;

    assert_eq!(
        test.db
            .refresh_tokens()
            .count_active_for_user(user_id, now())
            .await
            .unwrap(),
        3
    );

    let bearer = format!("Bearer {}", access);
    let response = send(
        &test.app,
        "POST",
        "/auth/logout-all",
        &[("authorization", bearer.as_str())],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        test.db
            .refresh_tokens()
            .count_active_for_user(user_id, now())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_logout_all_requires_authentication() {
    let test = create_test_app().await;

    let response = send(&test.app, "POST", "/auth/logout-all", &[], None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_bearer_token_fails_closed() {
    let test = create_test_app().await;

    let response = send(
        &test.app,
        "POST",
        "/auth/logout-all",
        &[("authorization", "Bearer not.a.jwt")],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &test.app,
        "POST",
        "/auth/logout-all",
        &[("authorization", "Basic abc123")],
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
