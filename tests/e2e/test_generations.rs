//! E2E tests: generation submission and job snapshots over HTTP.

use std::time::Duration;

use actix_web::cookie::Cookie;
use actix_web::test;
use imagine_lib::middleware::JobTag;
use serde_json::{Value, json};

use super::mock_providers::MockGenerationApi;
use super::test_helpers::*;

/// Poll the current-job endpoint until the job leaves the loading state.
async fn wait_for_settled<S>(app: &S, cookie: &Cookie<'static>) -> Value
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    for _ in 0..200 {
        let req = test::TestRequest::get()
            .uri("/api/v1/generations/current")
            .cookie(cookie.clone())
            .to_request();
        let body: Value = test::call_and_read_body_json(app, req).await;
        if body["loading"] == false {
            return body;
        }
        actix_rt::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("generation job never settled");
}

/// (1) A submitted job is accepted and its snapshot ends with the output URLs.
#[actix_rt::test]
async fn test_submit_and_observe_completion() {
    let generation = MockGenerationApi::start().await;
    generation
        .job(
            "proc-1",
            json!({
                "status": "COMPLETED",
                "result": { "output": ["https://img.example/1.png", "https://img.example/2.png"] }
            }),
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("1", "painter", None)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(cookie.clone())
        .set_json(json!({
            "prompt": "a lighthouse at dusk",
            "negprompt": "blurry",
            "style": "Anime",
            "aspect_ratio": "landscape",
            "samples": 2
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 202);
    assert_eq!(
        resp.response().extensions().get::<JobTag>(),
        Some(&JobTag("proc-1".to_string()))
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["process_id"], "proc-1");
    assert_eq!(body["state"]["state"], "submitted");

    let snapshot = wait_for_settled(&app, &cookie).await;
    assert_eq!(snapshot["state"]["state"], "completed");
    assert_eq!(
        snapshot["images"],
        json!(["https://img.example/1.png", "https://img.example/2.png"])
    );
    assert!(snapshot["error"].is_null());

    let submissions = generation.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["style"], "Anime");
    assert_eq!(submissions[0]["safe_filter"], true);
}

/// (2) Sample counts above the maximum are clamped before reaching the provider.
#[actix_rt::test]
async fn test_samples_are_clamped_on_the_wire() {
    let generation = MockGenerationApi::start().await;
    generation
        .job(
            "proc-9",
            json!({ "status": "COMPLETED", "result": { "output": ["https://img.example/x.png"] } }),
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("2", "greedy", None)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(cookie)
        .set_json(json!({ "prompt": "many cats", "samples": 50 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 202);

    let submissions = generation.submissions().await;
    assert_eq!(submissions[0]["samples"], 4);
}

/// (3) A blank prompt is rejected before the provider is contacted.
#[actix_rt::test]
async fn test_blank_prompt_rejected() {
    let generation = MockGenerationApi::start().await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("3", "quiet", None)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(cookie)
        .set_json(json!({ "prompt": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "INVALID_INPUT");
    assert!(generation.submissions().await.is_empty());
}

/// (4) A provider failure is surfaced in the snapshot with loading cleared.
#[actix_rt::test]
async fn test_provider_failure_surfaces_message() {
    let generation = MockGenerationApi::start().await;
    generation
        .job(
            "proc-f",
            json!({ "status": "FAILED", "error": { "message": "NSFW content detected" } }),
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("4", "edgy", None)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(cookie.clone())
        .set_json(json!({ "prompt": "something questionable" }))
        .to_request();
    test::call_service(&app, req).await;

    let snapshot = wait_for_settled(&app, &cookie).await;
    assert_eq!(snapshot["state"]["state"], "failed");
    assert!(
        snapshot["error"]
            .as_str()
            .unwrap_or_default()
            .contains("NSFW content detected")
    );
    assert_eq!(snapshot["images"], json!([]));
}

/// (5) An unreachable provider fails the submission with 502.
#[actix_rt::test]
async fn test_submission_failure_is_bad_gateway() {
    let generation = MockGenerationApi::start().await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("5", "unlucky", None)).await;

    // No mocks mounted: the provider answers 404.
    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(cookie.clone())
        .set_json(json!({ "prompt": "a quiet harbor" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 502);

    let req = test::TestRequest::get()
        .uri("/api/v1/generations/current")
        .cookie(cookie)
        .to_request();
    let snapshot: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(snapshot["loading"], false);
    assert!(snapshot["error"].is_string());
}

/// (6) Before any submission there is no current job; cancelling is a no-op.
#[actix_rt::test]
async fn test_no_current_job() {
    let pool = create_test_pool().await;
    let config = test_config("http://unused", "http://unused");
    let app = create_test_app(&pool, &config).await;
    let (_, cookie) = login_as(&pool, &config, &github_profile("6", "idle", None)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/generations/current")
        .cookie(cookie.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);

    let req = test::TestRequest::delete()
        .uri("/api/v1/generations/current")
        .cookie(cookie)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["cancelled"], false);
}

/// (7) Job slots are per user.
#[actix_rt::test]
async fn test_jobs_are_scoped_to_the_caller() {
    let generation = MockGenerationApi::start().await;
    generation
        .job(
            "proc-a",
            json!({ "status": "COMPLETED", "result": { "output": ["https://img.example/a.png"] } }),
        )
        .await;
    let pool = create_test_pool().await;
    let config = test_config("http://unused", &generation.uri());
    let app = create_test_app(&pool, &config).await;
    let (_, alice) = login_as(&pool, &config, &github_profile("10", "alice", None)).await;
    let (_, bob) = login_as(&pool, &config, &github_profile("11", "bob", None)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/generations")
        .cookie(alice.clone())
        .set_json(json!({ "prompt": "alice's garden" }))
        .to_request();
    test::call_service(&app, req).await;
    wait_for_settled(&app, &alice).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/generations/current")
        .cookie(bob)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
