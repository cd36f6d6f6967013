// Integration tests for error normalization in production and development mode

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Router, middleware};
use http_body_util::BodyExt;
use recall::config::Mode;
use recall::server::error::{ApiError, ErrorBody, normalize_errors};
use recall::server::{self, USER_HEADER, store::Store};
use tower::ServiceExt;

async fn send(app: Router, request: Request<Body>) -> (StatusCode, ErrorBody) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn failing_app(mode: Mode) -> Router {
    Router::new()
        .route(
            "/boom",
            get(|| async {
                Err::<(), _>(
                    ApiError::internal(std::io::Error::other("disk on fire"))
                        .with_details(serde_json::json!({ "disk": "sda" })),
                )
            }),
        )
        .route(
            "/teapot",
            get(|| async {
                Err::<(), _>(ApiError::status(StatusCode::IM_A_TEAPOT, "short and stout"))
            }),
        )
        .route(
            "/plain",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream went away") }),
        )
        .layer(middleware::from_fn_with_state(mode, normalize_errors))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_tag(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/tags")
        .header(USER_HEADER, "alice")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_validation_error_is_400_in_both_modes() {
    for mode in [Mode::Production, Mode::Development] {
        let app = server::router(Arc::new(Store::new()), mode);
        let (status, body) = send(app, post_tag(r#"{"name": ""}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Validation error");
        let errors = body.errors.unwrap();
        assert_eq!(errors[0].path, vec!["name".to_owned()]);
        assert_eq!(body.stack, None);
        assert_eq!(body.details, None);
    }
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = server::router(Arc::new(Store::new()), Mode::Production);
    let (status, body) = send(app, post_tag("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.message, "Validation error");
    assert!(body.errors.is_some());
}

#[tokio::test]
async fn test_internal_error_in_production_hides_diagnostics() {
    let (status, body) = send(failing_app(Mode::Production), get_request("/boom")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.message, "Internal Server Error");
    assert_eq!(body.errors, None);
    assert_eq!(body.stack, None);
    assert_eq!(body.details, None);
}

#[tokio::test]
async fn test_internal_error_in_development_shows_diagnostics() {
    let (status, body) = send(failing_app(Mode::Development), get_request("/boom")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.message, "Internal Server Error");
    assert!(body.stack.unwrap().contains("disk on fire"));
    assert_eq!(body.details, Some(serde_json::json!({ "disk": "sda" })));
}

#[tokio::test]
async fn test_explicit_status_and_message_are_kept() {
    let (status, body) = send(failing_app(Mode::Production), get_request("/teapot")).await;

    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body.message, "short and stout");
}

#[tokio::test]
async fn test_plain_error_responses_are_normalized() {
    let (status, body) = send(failing_app(Mode::Production), get_request("/plain")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body.message, "upstream went away");
}

#[tokio::test]
async fn test_unknown_route_is_normalized() {
    let app = server::router(Arc::new(Store::new()), Mode::Development);
    let (status, body) = send(app, get_request("/api/nowhere")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.message, "Not Found");
    assert!(body.stack.is_some());
}

#[tokio::test]
async fn test_router_errors_share_the_shape() {
    let store = Arc::new(Store::new());

    let (status, body) = send(
        server::router(store.clone(), Mode::Production),
        get_request("/api/tags"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body.message, "Unauthorized");

    let request = Request::builder()
        .uri("/api/reports/not-a-number")
        .header(USER_HEADER, "alice")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(server::router(store.clone(), Mode::Production), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.message.is_empty());

    let request = Request::builder()
        .uri("/api/search?q=ab&type=podcast")
        .header(USER_HEADER, "alice")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(server::router(store, Mode::Production), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.errors.unwrap()[0].path, vec!["type".to_owned()]);
}

#[tokio::test]
async fn test_empty_search_returns_no_results() {
    let app = server::router(Arc::new(Store::new()), Mode::Production);
    let request = Request::builder()
        .uri("/api/search?q=")
        .header(USER_HEADER, "alice")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json, serde_json::json!({ "results": [] }));
}
