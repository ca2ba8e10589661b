//! In-process tests of the assembled router.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use cuneus::http::RequestId;
use cuneus::{build_app, AppError, Application, SharedState, Svc};
use serde_json::json;

mod common;

use common::{events, get, send, settings, Database, DatabaseExtension, Events};

async fn not_found() -> Result<String, AppError> {
    Err(AppError::not_found().with_message("Item 7 not found"))
}

async fn throttled() -> Result<String, AppError> {
    Err(AppError::rate_limited(Some(30)))
}

async fn broken() -> &'static str {
    panic!("handler exploded")
}

async fn state_url(SharedState(state): SharedState) -> Result<String, AppError> {
    Ok(state.get::<String>("database_url")?.to_string())
}

async fn echo_id(RequestId(id): RequestId) -> axum::Json<String> {
    axum::Json(id)
}

async fn unregistered(Svc(value): Svc<u64>) -> String {
    value.to_string()
}

fn app_with(settings: cuneus::Settings, log: &Events) -> (Application, Arc<std::sync::atomic::AtomicBool>) {
    let database = DatabaseExtension::new(log);
    let healthy = database.healthy.clone();
    let (app, _cli) = build_app(settings)
        .extension(database)
        .routes(|r| {
            r.get("/items/7", not_found)
                .get("/throttled", throttled)
                .get("/broken", broken)
                .get("/state", state_url)
                .get("/whoami", echo_id)
                .get("/unregistered", unregistered);
        })
        .build()
        .unwrap();
    (app, healthy)
}

#[tokio::test]
async fn test_health_reports_every_pinged_service() {
    let log = Events::default();
    let (app, healthy) = app_with(settings(), &log);
    let guard = app.start().await.unwrap();

    let (status, _, body) = send(app.router(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "healthy",
            "version": "1.2.3",
            "services": [{"name": "Database", "status": "healthy"}]
        })
    );

    healthy.store(false, Ordering::SeqCst);
    let (status, _, body) = send(app.router(), get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["services"][0]["message"], "connection refused");

    guard.shutdown().await;
}

#[tokio::test]
async fn test_probes() {
    let log = Events::default();
    let (app, healthy) = app_with(settings(), &log);
    let guard = app.start().await.unwrap();

    let (status, _, body) = send(app.router(), get("/healthz/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, _, body) = send(app.router(), get("/healthz/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    healthy.store(false, Ordering::SeqCst);
    let (status, _, body) = send(app.router(), get("/healthz/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "service_unavailable");
    assert_eq!(body["error"]["message"], "Database unhealthy");

    guard.shutdown().await;
}

#[tokio::test]
async fn test_request_id_generated_or_echoed() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let (_, headers, body) = send(app.router(), get("/whoami")).await;
    let generated = headers["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(generated.len(), 8);
    assert_eq!(body, json!(generated));

    let request = Request::builder()
        .uri("/whoami")
        .header("X-Request-ID", "client-supplied")
        .body(Body::empty())
        .unwrap();
    let (_, headers, body) = send(app.router(), request).await;
    assert_eq!(headers["x-request-id"], "client-supplied");
    assert_eq!(body, json!("client-supplied"));
}

#[tokio::test]
async fn test_app_error_body_carries_request_id() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let request = Request::builder()
        .uri("/items/7")
        .header("X-Request-ID", "req-42")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(app.router(), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["x-request-id"], "req-42");
    assert_eq!(
        body,
        json!({"error": {
            "status": 404,
            "code": "not_found",
            "message": "Item 7 not found",
            "request_id": "req-42"
        }})
    );
}

#[tokio::test]
async fn test_rate_limited_sets_retry_after() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let (status, headers, body) = send(app.router(), get("/throttled")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers[header::RETRY_AFTER], "30");
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn test_panic_becomes_generic_500() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let (status, headers, body) = send(app.router(), get("/broken")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
    assert_eq!(body["error"]["message"], "An unexpected error occurred");
    assert_eq!(body["error"]["request_id"], headers["x-request-id"].to_str().unwrap());
    assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn test_panic_details_in_debug() {
    let log = Events::default();
    let debug = cuneus::Settings {
        debug: true,
        ..settings()
    };
    let (app, _) = app_with(debug, &log);

    let (_, _, body) = send(app.router(), get("/broken")).await;
    assert_eq!(body["error"]["details"]["message"], "handler exploded");
}

#[tokio::test]
async fn test_services_and_state_reach_handlers() {
    let log = Events::default();
    let settings = {
        let mut s = settings();
        s.extra.insert("database_url".into(), json!("postgres://db/test"));
        s
    };
    let (app, _) = app_with(settings, &log);
    let guard = app.start().await.unwrap();

    let (_, _, body) = send(app.router(), get("/db")).await;
    assert_eq!(body, json!("postgres://db/test"));

    let (_, _, body) = send(app.router(), get("/state")).await;
    assert_eq!(body, json!("postgres://db/test"));

    guard.shutdown().await;

    let (status, _, body) = send(app.router(), get("/state")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
}

#[tokio::test]
async fn test_override_wins_over_setup_registration() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    app.registry().override_value(Database {
        url: "sqlite::memory:".into(),
        healthy: Arc::default(),
    });
    let guard = app.start().await.unwrap();

    let (_, _, body) = send(app.router(), get("/db")).await;
    assert_eq!(body, json!("sqlite::memory:"));

    app.registry().clear_overrides();
    let (_, _, body) = send(app.router(), get("/db")).await;
    assert_eq!(body, json!("postgres://localhost/app"));

    guard.shutdown().await;
    assert_eq!(events(&log), vec!["database:setup", "database:teardown"]);
}

#[tokio::test]
async fn test_missing_service_is_json_500() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let (status, _, body) = send(app.router(), get("/unregistered")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "internal_error");
}

#[tokio::test]
async fn test_unknown_route_passes_through() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let (status, headers, _) = send(app.router(), get("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_route_table() {
    let log = Events::default();
    let (app, _) = app_with(settings(), &log);

    let paths: Vec<_> = app.routes().iter().map(|r| r.path.as_str()).collect();
    assert!(paths.contains(&"/healthz/ready"));
    assert!(paths.contains(&"/db"));
    assert!(paths.contains(&"/items/7"));
}
