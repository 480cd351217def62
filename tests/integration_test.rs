use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mastery_backend::services::evaluation::EvaluationConfig;

mod common;

use common::{get, post_json, send};

#[tokio::test]
async fn test_health_root() {
    let ctx = common::setup().await;
    let (status, body) = send(ctx.app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_health_live() {
    let ctx = common::setup().await;
    let (status, body) = send(ctx.app(), get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let ctx = common::setup().await;
    let (status, body) = send(ctx.app(), get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_update_mastery_round_trip() {
    let ctx = common::setup().await;

    let (status, body) = send(
        ctx.app(),
        post_json(
            "/api/mastery",
            json!({ "learnerId": "u1", "tags": ["html-basics", "css-styling"], "result": "pass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["updates"][0]["concept"], "html-basics");
    assert_eq!(body["updates"][0]["oldMastery"], 800.0);
    assert_eq!(body["updates"][0]["newMastery"], 816.0);
    assert_eq!(body["updates"][1]["change"], 16.0);
    assert!(body.get("failed").is_none());

    let (status, body) = send(ctx.app(), get("/api/mastery?learnerId=u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["learnerId"], "u1");
    assert_eq!(body["progress"].as_array().unwrap().len(), 2);
    assert_eq!(body["progress"][0]["successRate"], "100.0");
}

#[tokio::test]
async fn test_partial_update_failure_is_unavailable() {
    let ctx = common::setup().await;
    let state = common::state_with_broken_concept(&ctx, "css-styling").await;

    let (status, body) = send(
        mastery_backend::create_app(state),
        post_json(
            "/api/mastery",
            json!({ "learnerId": "nina", "tags": ["html-basics", "css-styling"], "result": "fail" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ok"], false);
    assert_eq!(body["updates"].as_array().unwrap().len(), 1);
    assert_eq!(body["updates"][0]["concept"], "html-basics");
    assert_eq!(body["updates"][0]["newMastery"], 784.0);
    assert_eq!(body["failed"][0]["concept"], "css-styling");
    assert_eq!(body["failed"][0]["error"], "temporarily unavailable, please try again");

    let (_, body) = send(ctx.app(), get("/api/mastery?learnerId=nina")).await;
    assert_eq!(body["progress"].as_array().unwrap().len(), 1);
    assert_eq!(body["progress"][0]["concept"], "html-basics");
}

#[tokio::test]
async fn test_user_id_alias_is_accepted() {
    let ctx = common::setup().await;
    let (status, _) = send(
        ctx.app(),
        post_json(
            "/api/mastery",
            json!({ "userId": "legacy", "tags": ["js"], "result": "fail" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(ctx.app(), get("/api/mastery?userId=legacy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"][0]["mastery"], 784.0);
}

#[tokio::test]
async fn test_update_mastery_validation() {
    let ctx = common::setup().await;

    let cases = [
        (json!({ "tags": ["a"], "result": "pass" }), "learnerId"),
        (json!({ "learnerId": "u2", "tags": [], "result": "pass" }), "tags"),
        (json!({ "learnerId": "u2", "result": "pass" }), "tags"),
        (json!({ "learnerId": "u2", "tags": ["a", "  "], "result": "pass" }), "tags[1]"),
        (json!({ "learnerId": "u2", "tags": ["a"], "result": "maybe" }), "result"),
    ];
    for (payload, field) in cases {
        let (status, body) = send(ctx.app(), post_json("/api/mastery", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(
            body["error"].as_str().unwrap().contains(field),
            "error {body} should mention {field}"
        );
    }

    let (_, body) = send(ctx.app(), get("/api/mastery?learnerId=u2")).await;
    assert!(body["progress"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let ctx = common::setup().await;
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/mastery")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let (status, body) = send(ctx.app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_read_mastery_requires_learner() {
    let ctx = common::setup().await;
    let (status, body) = send(ctx.app(), get("/api/mastery")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "learnerId is required");
}

#[tokio::test]
async fn test_update_with_unknown_task_is_not_found() {
    let ctx = common::seeded().await;
    let (status, body) = send(
        ctx.app(),
        post_json(
            "/api/mastery",
            json!({ "learnerId": "u3", "tags": ["html-basics"], "result": "pass", "taskId": "ghost" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_task_listing_and_filters() {
    let ctx = common::seeded().await;

    let (status, body) = send(ctx.app(), get("/api/tasks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 4);
    assert_eq!(body["tasks"][0]["id"], "html-basics-1");
    assert!(body["tasks"][0].get("createdAt").is_none());

    let (_, body) = send(ctx.app(), get("/api/tasks?difficulty=1")).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 2);

    let (_, body) = send(ctx.app(), get("/api/tasks?difficulty=9")).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 4);

    let (_, body) = send(ctx.app(), get("/api/tasks?concept=css-styling")).await;
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], "css-basics-1");
    assert_eq!(tasks[0]["concepts"], json!(["css-styling"]));

    let concept_id = tasks[0]["conceptIds"][0].as_str().unwrap().to_string();
    let (_, body) = send(ctx.app(), get(&format!("/api/tasks?conceptId={concept_id}"))).await;
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], "css-basics-1");
}

#[tokio::test]
async fn test_task_detail() {
    let ctx = common::seeded().await;

    let (status, body) = send(ctx.app(), get("/api/tasks/html-basics-1")).await;
    assert_eq!(status, StatusCode::OK);
    let task = &body["task"];
    assert_eq!(task["title"], "Create Your First Webpage");
    assert_eq!(task["tests"][0]["id"], "has-h1");
    assert_eq!(task["hints"][2]["level"], 3);
    assert!(task["scaffold"]["index.html"].is_string());

    let (status, body) = send(ctx.app(), get("/api/tasks/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Task not found");
}

#[tokio::test]
async fn test_next_task_strategies() {
    let ctx = common::seeded().await;

    let (status, body) = send(
        ctx.app(),
        post_json("/api/tasks/next", json!({ "learnerId": "u4", "strategy": "sequential" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["id"], "html-basics-1");
    assert_eq!(body["task"]["difficulty"], 1);

    let (status, body) = send(
        ctx.app(),
        post_json("/api/tasks/next", json!({ "learnerId": "u4", "strategy": "just-right" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["id"], "css-basics-1");

    let (status, body) = send(
        ctx.app(),
        post_json("/api/tasks/next", json!({ "learnerId": "u4", "strategy": "random" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_next_task_empty_catalog() {
    let ctx = common::setup().await;
    let (status, body) = send(
        ctx.app(),
        post_json("/api/tasks/next", json!({ "learnerId": "u5", "strategy": "sequential" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["task"].is_null());
}

fn eval_config(server: &MockServer) -> EvaluationConfig {
    EvaluationConfig {
        base_url: server.uri(),
        token: "lms-token".into(),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_eval_proxy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/eval"))
        .and(header("X-LMS-Service-Token", "lms-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "passed": true,
            "passedIds": ["has-h1"],
            "failedIds": [],
            "messages": {}
        })))
        .mount(&server)
        .await;

    let ctx = common::setup_with_eval(eval_config(&server)).await;
    let payload = json!({
        "task": { "tests": [{ "id": "has-h1", "code": "document.querySelector('h1') !== null" }] },
        "files": { "index.html": "<h1>Hello World</h1>" }
    });
    let (status, body) = send(ctx.app(), post_json("/api/eval", payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["passed"], true);
    assert_eq!(body["passedIds"], json!(["has-h1"]));
}

#[tokio::test]
async fn test_eval_rejects_bad_submission() {
    let ctx = common::setup().await;
    let (status, body) = send(
        ctx.app(),
        post_json("/api/eval", json!({ "task": { "tests": [{ "id": "x" }] }, "files": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Each test must have an id and code property");
}

#[tokio::test]
async fn test_eval_upstream_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/eval"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let ctx = common::setup_with_eval(eval_config(&server)).await;
    let payload = json!({ "task": { "tests": [] }, "files": {} });
    let (status, body) = send(ctx.app(), post_json("/api/eval", payload)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "BAD_GATEWAY");
}

#[tokio::test]
async fn test_eval_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let ctx = common::setup_with_eval(eval_config(&server)).await;
    let (status, body) = send(ctx.app(), get("/api/eval")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);

    let down = common::setup_with_eval(EvaluationConfig {
        base_url: "http://127.0.0.1:9".into(),
        token: String::new(),
        timeout: Duration::from_millis(500),
    })
    .await;
    let (status, body) = send(down.app(), get("/api/eval")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["available"], false);
}
