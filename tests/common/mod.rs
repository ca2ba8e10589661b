//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use cuneus::http::Routes;
use cuneus::{async_trait, BoxError, Extension, ExtensionState, LifecycleContext, Settings, Svc};
use serde_json::Value;
use tower::ServiceExt;

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events(log: &Events) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Stand-in for a database connection pool.
#[derive(Debug)]
pub struct Database {
    pub url: String,
    pub healthy: Arc<AtomicBool>,
}

async fn ping_database(db: Arc<Database>) -> Result<(), BoxError> {
    if db.healthy.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err("connection refused".into())
    }
}

async fn database_url(Svc(db): Svc<Database>) -> String {
    db.url.clone()
}

/// Registers [`Database`] with a ping and contributes `database_url` state.
pub struct DatabaseExtension {
    pub healthy: Arc<AtomicBool>,
    pub events: Events,
}

impl DatabaseExtension {
    pub fn new(events: &Events) -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            events: events.clone(),
        }
    }
}

#[async_trait]
impl Extension for DatabaseExtension {
    fn name(&self) -> &str {
        "database"
    }

    fn routes(&self, routes: &mut Routes) {
        routes.get("/db", database_url);
    }

    async fn setup(&self, ctx: &LifecycleContext) -> Result<ExtensionState, BoxError> {
        let url = ctx
            .settings()
            .get::<String>("database_url")
            .unwrap_or_else(|| "postgres://localhost/app".to_string());

        ctx.registry().register_value_with_ping(
            Database {
                url: url.clone(),
                healthy: self.healthy.clone(),
            },
            ping_database,
        );
        self.events.lock().unwrap().push("database:setup".into());
        Ok(ExtensionState::new().with("database_url", url))
    }

    async fn teardown(&self, _ctx: &LifecycleContext) -> Result<(), BoxError> {
        self.events.lock().unwrap().push("database:teardown".into());
        Ok(())
    }
}

pub fn settings() -> Settings {
    Settings {
        app_name: "testapp".into(),
        version: Some("1.2.3".into()),
        log_level: "warn".into(),
        startup_timeout_secs: 5,
        shutdown_timeout_secs: 5,
        ..Settings::default()
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Send one request through the router; the body is parsed as JSON when possible.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}
