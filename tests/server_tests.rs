use std::sync::Arc;

use actix_web::{App, test, web};
use assert_json_diff::assert_json_include;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use codeharness::Harness;
use codeharness::queue::JobQueue;
use codeharness::routes::{get_languages_handler, json_error_handler, post_execute_handler};
use codeharness::worker::worker;

fn start_worker(job_queue: Arc<JobQueue>) -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn(worker(
        1,
        Arc::new(Harness::default()),
        job_queue,
        token.clone(),
    ));
    token
}

#[actix_web::test]
async fn test_post_execute_success() {
    let job_queue = Arc::new(JobQueue::new());
    let token = start_worker(job_queue.clone());

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(job_queue))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(post_execute_handler),
    )
    .await;

    let request_body = json!({
        "code": "fn solution(a, b) { a + b }",
        "language": "rhai",
        "testCases": [
            { "input": "[2, 3]", "expectedOutput": "5" },
            { "input": "[2, 3]", "expectedOutput": "6" }
        ]
    });

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(&request_body)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_json_include!(
        actual: response_body,
        expected: json!({
            "success": false,
            "casesPassed": 1,
            "casesTotal": 2,
            "setupError": null,
            "cases": [
                { "index": 1, "passed": true, "actualOutput": "5", "error": null },
                { "index": 2, "passed": false, "actualOutput": "5", "error": null }
            ]
        })
    );

    token.cancel();
}

#[actix_web::test]
async fn test_post_execute_setup_error_is_still_ok() {
    let job_queue = Arc::new(JobQueue::new());
    let token = start_worker(job_queue.clone());

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(job_queue))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(post_execute_handler),
    )
    .await;

    let request_body = json!({
        "code": "print 'hi'",
        "language": "cobol",
        "testCases": [{ "input": "1", "output": "1" }]
    });

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(&request_body)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body["success"], false);
    assert_eq!(response_body["casesTotal"], 1);
    assert!(
        response_body["setupError"]
            .as_str()
            .unwrap()
            .starts_with("unsupported language")
    );

    token.cancel();
}

#[actix_web::test]
async fn test_post_execute_invalid_json() {
    let job_queue = Arc::new(JobQueue::new());

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(job_queue))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .service(post_execute_handler),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/execute")
        .set_json(json!({ "language": "rhai" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(response_body, json!({ "reason": "ERR_INVALID_ARGUMENT", "code": 1 }));
}

#[actix_web::test]
async fn test_get_languages() {
    let app = test::init_service(App::new().service(get_languages_handler)).await;

    let req = test::TestRequest::get().uri("/languages").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let response_body: serde_json::Value = test::read_body_json(resp).await;
    let languages = response_body.as_array().unwrap();
    assert_eq!(languages.len(), 5);
    assert_json_include!(
        actual: response_body,
        expected: json!([
            { "name": "rhai", "executable": true },
            { "name": "python", "aliases": ["python", "python3", "py"], "executable": true },
            { "name": "javascript", "executable": true },
            { "name": "java", "executable": false },
            { "name": "cpp", "executable": false }
        ])
    );
}
