//! Health endpoints backed by service pings.
//!
//! Adds, under `health_prefix`:
//! - `GET <prefix>`: pings every service that registered a ping
//! - `GET <prefix>/live`: liveness, always 200
//! - `GET <prefix>/ready`: readiness, 503 if any ping fails

use async_trait::async_trait;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::http::{AppError, AppSettings, Routes, Services};
use crate::lifecycle::Extension;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: Option<String>,
    pub services: Vec<ServiceHealth>,
}

/// Default extension exposing health and probe endpoints.
#[derive(Debug, Clone)]
pub struct HealthExtension {
    enabled: bool,
    prefix: String,
}

impl HealthExtension {
    pub fn new(settings: &Settings) -> Self {
        let prefix = settings.health_prefix.trim_end_matches('/').to_string();
        Self {
            enabled: settings.health_enabled,
            prefix,
        }
    }

    fn path(&self, suffix: &str) -> String {
        match (self.prefix.as_str(), suffix) {
            ("", "") => "/".to_string(),
            (prefix, suffix) => format!("{prefix}{suffix}"),
        }
    }
}

#[async_trait]
impl Extension for HealthExtension {
    fn name(&self) -> &str {
        "health"
    }

    fn routes(&self, routes: &mut Routes) {
        if !self.enabled {
            return;
        }
        routes
            .get(&self.path(""), health)
            .get(&self.path("/live"), liveness)
            .get(&self.path("/ready"), readiness);
    }
}

async fn health(Services(services): Services, AppSettings(settings): AppSettings) -> Json<HealthResponse> {
    let mut report = Vec::new();
    let mut healthy = true;

    for ping in services.pings() {
        match ping.ping().await {
            Ok(()) => report.push(ServiceHealth {
                name: ping.name().to_string(),
                status: HealthStatus::Healthy,
                message: None,
            }),
            Err(e) => {
                tracing::warn!(service = %ping.name(), error = %e, "Health check failed");
                healthy = false;
                report.push(ServiceHealth {
                    name: ping.name().to_string(),
                    status: HealthStatus::Unhealthy,
                    message: Some(e.to_string()),
                });
            }
        }
    }

    Json(HealthResponse {
        status: if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        version: settings.version.clone(),
        services: report,
    })
}

async fn liveness() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn readiness(Services(services): Services) -> Result<Json<Value>, AppError> {
    for ping in services.pings() {
        if let Err(e) = ping.ping().await {
            tracing::warn!(service = %ping.name(), error = %e, "Readiness check failed");
            return Err(AppError::service_unavailable().with_message(format!("{} unhealthy", ping.name())));
        }
    }
    Ok(Json(json!({"status": "ok"})))
}
