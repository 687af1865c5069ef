//! E2E tests: OAuth login, session inspection, refresh and logout.

use actix_web::cookie::Cookie;
use actix_web::test;
use imagine_lib::config::{OAUTH_STATE_COOKIE, REFRESH_COOKIE, SESSION_COOKIE};
use imagine_lib::db::refresh_tokens;
use imagine_lib::entity::refresh_token;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{Value, json};

use super::mock_providers::MockProviders;
use super::test_helpers::*;

fn location(resp: &actix_web::dev::ServiceResponse) -> String {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// (1) Login redirects to the provider with a state that matches the cookie.
#[actix_rt::test]
async fn test_login_redirects_with_state() {
    let providers = MockProviders::start().await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get().uri("/auth/github").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status().as_u16(), 302);
    let state = response_cookie(&resp, OAUTH_STATE_COOKIE).expect("state cookie");
    assert_eq!(state.value().len(), 64);
    assert!(state.http_only().unwrap_or(false));

    let target = location(&resp);
    assert!(target.starts_with(&format!("{}/github/authorize?", providers.uri())));
    assert!(target.contains("client_id=github-client"));
    assert!(target.contains(&format!("state={}", state.value())));
    assert!(target.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fauth%2Fgithub%2Fcallback"));
}

/// (2) A full GitHub login establishes a session visible through /auth/me.
#[actix_rt::test]
async fn test_github_callback_establishes_session() {
    let providers = MockProviders::start().await;
    providers
        .github_user(
            json!({
                "id": 583231,
                "login": "octocat",
                "name": "The Octocat",
                "avatar_url": "https://avatars.example/583231",
                "email": null
            }),
            Some(json!([
                { "email": "octocat@github.com", "primary": true, "verified": true }
            ])),
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=expected-state")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "expected-state"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status().as_u16(), 302);
    assert_eq!(location(&resp), POST_LOGIN_REDIRECT);
    let session = response_cookie(&resp, SESSION_COOKIE).expect("session cookie");
    assert!(response_cookie(&resp, REFRESH_COOKIE).is_some());

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .cookie(session)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["user"]["display_name"], "octocat");
    assert_eq!(body["user"]["provider"], "github");
    assert_eq!(body["user"]["email"], "octocat@github.com");
    assert_eq!(body["user"]["avatar_url"], "https://avatars.example/583231");
}

/// (3) Google login stores the name and the placeholder when no email is exposed.
#[actix_rt::test]
async fn test_google_callback_without_email() {
    let providers = MockProviders::start().await;
    providers
        .google_user(json!({
            "sub": "110248495921238986420",
            "name": "Ada Lovelace",
            "picture": "https://lh3.example/ada"
        }))
        .await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get()
        .uri("/auth/google/callback?code=4%2F0Ab&state=s1")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "s1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 302);
    let session = response_cookie(&resp, SESSION_COOKIE).expect("session cookie");

    let req = test::TestRequest::get()
        .uri("/auth/me")
        .cookie(session)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["user"]["display_name"], "Ada Lovelace");
    assert_eq!(body["user"]["email"], "No public email");
}

/// (4) A state mismatch aborts the login before any provider call.
#[actix_rt::test]
async fn test_state_mismatch_is_rejected() {
    let providers = MockProviders::start().await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=forged")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "expected-state"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
    assert!(response_cookie(&resp, SESSION_COOKIE).is_none());

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=expected-state")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let received = providers.server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty());
}

/// (5) A failing profile endpoint aborts login with LOGIN_FAILED and no session.
#[actix_rt::test]
async fn test_provider_failure_is_login_failed() {
    let providers = MockProviders::start().await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=s")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "s"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status().as_u16(), 401);
    assert!(response_cookie(&resp, SESSION_COOKIE).is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "LOGIN_FAILED");
}

/// (5a) An unavailable identity store aborts login with no session issued.
#[actix_rt::test]
async fn test_store_failure_is_login_failed() {
    let providers = MockProviders::start().await;
    providers
        .github_user(
            json!({ "id": 31337, "login": "stranded", "email": "stranded@example.com" }),
            None,
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;
    break_identity_store(&pool).await;

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=s")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "s"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status().as_u16(), 401);
    assert!(response_cookie(&resp, SESSION_COOKIE).is_none());
    assert!(response_cookie(&resp, REFRESH_COOKIE).is_none());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "LOGIN_FAILED");

    let issued = refresh_token::Entity::find()
        .count(pool.connection())
        .await
        .unwrap();
    assert_eq!(issued, 0);
}

/// (6) /auth/me without a session answers with a null user.
#[actix_rt::test]
async fn test_me_without_session_is_null() {
    let pool = create_test_pool().await;
    let config = test_config("http://unused", "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get().uri("/auth/me").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["user"].is_null());
}

/// (7) Refresh rotates the token; the old one and a logged-out one are rejected.
#[actix_rt::test]
async fn test_refresh_rotation_and_logout() {
    let providers = MockProviders::start().await;
    providers
        .github_user(
            json!({ "id": 1, "login": "rotator", "email": "rot@example.com" }),
            None,
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config(&providers.uri(), "http://unused");
    let app = create_test_app(&pool, &config).await;

    let req = test::TestRequest::get()
        .uri("/auth/github/callback?code=abc&state=s")
        .cookie(Cookie::new(OAUTH_STATE_COOKIE, "s"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let first_refresh = response_cookie(&resp, REFRESH_COOKIE).expect("refresh cookie");

    // Rotate
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(first_refresh.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let second_refresh = response_cookie(&resp, REFRESH_COOKIE).expect("rotated cookie");
    assert_ne!(second_refresh.value(), first_refresh.value());

    // Old token is revoked
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(first_refresh)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    // Logout revokes the current token
    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .cookie(second_refresh.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let cleared = response_cookie(&resp, SESSION_COOKIE).expect("cleared session cookie");
    assert_eq!(cleared.value(), "");

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(second_refresh)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

/// (8) A refresh token is single-use even when presented twice at once.
#[actix_rt::test]
async fn test_concurrent_refresh_issues_one_pair() {
    let pool = create_test_pool().await;
    let config = test_config("http://unused", "http://unused");
    let app = create_test_app(&pool, &config).await;
    let (user, _) = login_as(&pool, &config, &github_profile("88", "racer", None)).await;

    let raw = refresh_tokens::generate_token();
    refresh_tokens::insert(
        pool.connection(),
        user.id,
        &refresh_tokens::hash_token(&raw),
        config.session.refresh_token_ttl_secs,
    )
    .await
    .unwrap();
    let cookie = Cookie::new(REFRESH_COOKIE, raw);

    let first = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(cookie.clone())
        .to_request();
    let second = test::TestRequest::post()
        .uri("/auth/refresh")
        .cookie(cookie)
        .to_request();
    let (a, b) = tokio::join!(
        test::call_service(&app, first),
        test::call_service(&app, second)
    );

    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 401]);
}

/// (9) Claiming a stored refresh token succeeds exactly once.
#[actix_rt::test]
async fn test_refresh_token_claim_is_single_use() {
    let pool = create_test_pool().await;
    let config = test_config("http://unused", "http://unused");
    let (user, _) = login_as(&pool, &config, &google_profile("g-88", "Once", None)).await;

    let hash = refresh_tokens::hash_token(&refresh_tokens::generate_token());
    refresh_tokens::insert(pool.connection(), user.id, &hash, 3600)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        refresh_tokens::claim_by_hash(pool.connection(), &hash),
        refresh_tokens::claim_by_hash(pool.connection(), &hash)
    );
    let claimed: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(claimed, vec![user.id]);

    assert_eq!(
        refresh_tokens::claim_by_hash(pool.connection(), &hash)
            .await
            .unwrap(),
        None
    );
}
